use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use nalgebra::DMatrix;

use crate::IoError;

/// In-memory archive of per-utterance vectors read from a Kaldi-style
/// text file:
///
/// ```text
/// utt1  [ 0.12 -1.3 4.0 ]
/// utt2  [ 0.5 0.25 -0.75 ]
/// ```
///
/// Brackets are optional. All vectors must share one dimension.
#[derive(Debug, Clone, Default)]
pub struct VectorArchive {
    keys: Vec<String>,
    index: HashMap<String, usize>,
    data: Vec<Vec<f64>>,
    dim: usize,
}

impl VectorArchive {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| IoError::file(path, e))?;
        let mut archive = Self::default();
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| IoError::file(path, e))?;
            let mut tokens = line.split_whitespace();
            let Some(key) = tokens.next() else {
                continue;
            };
            let mut values = Vec::new();
            for tok in tokens {
                if tok == "[" || tok == "]" {
                    continue;
                }
                let v: f64 = tok.parse().map_err(|_| {
                    IoError::InvalidFormat(format!(
                        "{}:{}: bad value {tok:?}",
                        path.display(),
                        lineno + 1
                    ))
                })?;
                values.push(v);
            }
            archive.push(key.to_string(), values)?;
        }
        Ok(archive)
    }

    /// Builds an archive from the rows of `x`.
    pub fn from_matrix(keys: &[String], x: &DMatrix<f64>) -> Result<Self, IoError> {
        if keys.len() != x.nrows() {
            return Err(IoError::InvalidFormat(format!(
                "{} keys for {} vectors",
                keys.len(),
                x.nrows()
            )));
        }
        let mut archive = Self::default();
        for (key, row) in keys.iter().zip(x.row_iter()) {
            archive.push(key.clone(), row.iter().copied().collect())?;
        }
        Ok(archive)
    }

    fn push(&mut self, key: String, values: Vec<f64>) -> Result<(), IoError> {
        if self.data.is_empty() {
            self.dim = values.len();
        } else if values.len() != self.dim {
            return Err(IoError::InvalidFormat(format!(
                "vector {key} has dimension {}, archive has {}",
                values.len(),
                self.dim
            )));
        }
        self.index.insert(key.clone(), self.data.len());
        self.keys.push(key);
        self.data.push(values);
        Ok(())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), IoError> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| IoError::file(path, e))?;
        let mut w = BufWriter::new(file);
        for (key, values) in self.keys.iter().zip(self.data.iter()) {
            write!(w, "{key}  [").map_err(|e| IoError::file(path, e))?;
            for v in values {
                write!(w, " {v}").map_err(|e| IoError::file(path, e))?;
            }
            writeln!(w, " ]").map_err(|e| IoError::file(path, e))?;
        }
        w.flush().map_err(|e| IoError::file(path, e))?;
        Ok(())
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&[f64]> {
        self.index.get(key).map(|&i| self.data[i].as_slice())
    }

    /// Stacks the vectors of `keys` into a matrix, one row per key.
    pub fn read<S: AsRef<str>>(&self, keys: &[S]) -> Result<DMatrix<f64>, IoError> {
        let mut x = DMatrix::zeros(keys.len(), self.dim);
        for (i, key) in keys.iter().enumerate() {
            let key = key.as_ref();
            let v = self
                .get(key)
                .ok_or_else(|| IoError::MissingKey(key.to_string()))?;
            for (j, &val) in v.iter().enumerate() {
                x[(i, j)] = val;
            }
        }
        Ok(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_with_and_without_brackets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xvec.txt");
        std::fs::write(&path, "u1  [ 1 2 3 ]\nu2 4.5 -5 6e-1\n").unwrap();

        let ar = VectorArchive::open(&path).unwrap();
        assert_eq!(ar.len(), 2);
        assert_eq!(ar.dim(), 3);
        assert_eq!(ar.get("u2"), Some(&[4.5, -5.0, 0.6][..]));

        let x = ar.read(&["u2", "u1"]).unwrap();
        assert_eq!(x.row(1).iter().copied().collect::<Vec<_>>(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn dimension_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.txt");
        std::fs::write(&path, "u1 [ 1 2 ]\nu2 [ 1 2 3 ]\n").unwrap();
        assert!(matches!(VectorArchive::open(&path), Err(IoError::InvalidFormat(_))));
    }

    #[test]
    fn read_missing_key() {
        let ar = VectorArchive::from_matrix(&["a".to_string()], &DMatrix::zeros(1, 2)).unwrap();
        assert!(matches!(ar.read(&["b"]), Err(IoError::MissingKey(_))));
    }

    #[test]
    fn save_then_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let keys = vec!["a".to_string(), "b".to_string()];
        let x = DMatrix::from_row_slice(2, 2, &[0.1, -0.2, 1.0 / 3.0, 7.0]);
        VectorArchive::from_matrix(&keys, &x).unwrap().save(&path).unwrap();
        let ar = VectorArchive::open(&path).unwrap();
        assert_eq!(ar.read(&keys).unwrap(), x);
    }
}
