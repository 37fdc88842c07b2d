use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::IoError;

/// Ordered mapping from utterance key to one auxiliary field
/// (speaker id, file path, cluster label).
///
/// Insertion order is preserved; duplicate keys are allowed, matching the
/// plain-text lists this type reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Utt2Info {
    key: Vec<String>,
    info: Vec<String>,
}

impl Utt2Info {
    /// Builds a list from parallel key and info columns.
    pub fn new(key: Vec<String>, info: Vec<String>) -> Result<Self, IoError> {
        if key.len() != info.len() {
            return Err(IoError::InvalidFormat(format!(
                "utt2info: {} keys but {} info values",
                key.len(),
                info.len()
            )));
        }
        Ok(Self { key, info })
    }

    /// Loads a two-column list. With `sep = None` the key is the first
    /// whitespace-separated token and the info is the rest of the line.
    pub fn load(path: impl AsRef<Path>, sep: Option<&str>) -> Result<Self, IoError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| IoError::file(path, e))?;
        let mut out = Self::default();
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| IoError::file(path, e))?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let split = match sep {
                Some(s) => line.split_once(s).map(|(k, v)| (k.trim(), v.trim())),
                None => line
                    .split_once(char::is_whitespace)
                    .map(|(k, v)| (k, v.trim())),
            };
            let Some((k, v)) = split else {
                return Err(IoError::InvalidFormat(format!(
                    "{}:{}: expected two fields",
                    path.display(),
                    lineno + 1
                )));
            };
            out.key.push(k.to_string());
            out.info.push(v.to_string());
        }
        Ok(out)
    }

    /// Writes `key{sep}info` lines.
    pub fn save(&self, path: impl AsRef<Path>, sep: &str) -> Result<(), IoError> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| IoError::file(path, e))?;
        let mut w = BufWriter::new(file);
        for (k, v) in self.iter() {
            writeln!(w, "{k}{sep}{v}").map_err(|e| IoError::file(path, e))?;
        }
        w.flush().map_err(|e| IoError::file(path, e))?;
        Ok(())
    }

    pub fn key(&self) -> &[String] {
        &self.key
    }

    pub fn info(&self) -> &[String] {
        &self.info
    }

    pub fn len(&self) -> usize {
        self.key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.key.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.key
            .iter()
            .zip(self.info.iter())
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Info of the first entry with `key`.
    pub fn info_of(&self, key: &str) -> Option<&str> {
        self.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    /// Keeps (or, with `keep = false`, drops) the entries whose key is in
    /// `keys`. Order of the remaining entries is unchanged.
    pub fn filter<S: AsRef<str>>(&self, keys: &[S], keep: bool) -> Self {
        let set: HashSet<&str> = keys.iter().map(|k| k.as_ref()).collect();
        let mut out = Self::default();
        for (k, v) in self.iter() {
            if set.contains(k) == keep {
                out.key.push(k.to_string());
                out.info.push(v.to_string());
            }
        }
        out
    }

    /// Keeps the entries at `indices`, in the given order.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            key: indices.iter().map(|&i| self.key[i].clone()).collect(),
            info: indices.iter().map(|&i| self.info[i].clone()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_whitespace_and_custom_sep() {
        let dir = tempfile::tempdir().unwrap();
        let ws = dir.path().join("utt2spk");
        std::fs::write(&ws, "utt1 spkA\nutt2\tspkB\n\nutt3   spkA\n").unwrap();
        let u = Utt2Info::load(&ws, None).unwrap();
        assert_eq!(u.key(), &["utt1", "utt2", "utt3"]);
        assert_eq!(u.info(), &["spkA", "spkB", "spkA"]);

        let eq = dir.path().join("list.scp");
        std::fs::write(&eq, "utt1=/data/a.ark:10\nutt2=/data/a.ark:90\n").unwrap();
        let u = Utt2Info::load(&eq, Some("=")).unwrap();
        assert_eq!(u.info_of("utt2"), Some("/data/a.ark:90"));
    }

    #[test]
    fn load_rejects_single_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad");
        std::fs::write(&path, "utt1\n").unwrap();
        assert!(matches!(
            Utt2Info::load(&path, None),
            Err(IoError::InvalidFormat(_))
        ));
    }

    #[test]
    fn save_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.scp");
        let u = Utt2Info::new(
            vec!["z".into(), "a".into(), "m".into()],
            vec!["2".into(), "0".into(), "1".into()],
        )
        .unwrap();
        u.save(&path, " ").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "z 2\na 0\nm 1\n");
        assert_eq!(Utt2Info::load(&path, None).unwrap(), u);
    }

    #[test]
    fn filter_keep_and_drop() {
        let u = Utt2Info::new(
            vec!["a".into(), "b".into(), "c".into()],
            vec!["1".into(), "2".into(), "3".into()],
        )
        .unwrap();
        assert_eq!(u.filter(&["c", "a"], true).key(), &["a", "c"]);
        assert_eq!(u.filter(&["c", "a"], false).key(), &["b"]);
    }

    #[test]
    fn new_length_mismatch() {
        assert!(Utt2Info::new(vec!["a".into()], vec![]).is_err());
    }
}
