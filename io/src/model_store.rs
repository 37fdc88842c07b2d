use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use nalgebra::{DMatrix, DVector};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::IoError;

const STORE_MAGIC: &str = "hyperion-model";
const STORE_VERSION: u32 = 1;

/// One value in a [`ModelStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entry {
    /// Dense float array, row-major.
    Array { shape: Vec<usize>, data: Vec<f64> },
    /// Scalar configuration (dimensions, hyperparameters, class name).
    Config { value: serde_json::Value },
}

/// Keyed container for model parameters.
///
/// Keys are `/`-separated paths; every model writes under its own name so
/// several models (e.g. the members of a transform list) share one file.
///
/// The on-disk format is JSON:
///
/// ```text
/// { "magic": "hyperion-model", "version": 1,
///   "entries": { "plda/mu": { "kind": "array", "shape": [5], "data": [...] },
///                "plda/config": { "kind": "config", "value": {...} } } }
/// ```
///
/// Floats are written in shortest round-trip form, so `open(save(m)) == m`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelStore {
    magic: String,
    version: u32,
    entries: BTreeMap<String, Entry>,
}

impl Default for ModelStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelStore {
    pub fn new() -> Self {
        Self {
            magic: STORE_MAGIC.to_string(),
            version: STORE_VERSION,
            entries: BTreeMap::new(),
        }
    }

    /// Joins a model name and a parameter name into a key.
    pub fn key(name: &str, param: &str) -> String {
        format!("{name}/{param}")
    }

    /// Reads a container written by [`ModelStore::save`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| IoError::file(path, e))?;
        let store: ModelStore = serde_json::from_reader(BufReader::new(file))?;
        if store.magic != STORE_MAGIC {
            return Err(IoError::InvalidFormat(format!(
                "{}: invalid magic {:?}",
                path.display(),
                store.magic
            )));
        }
        if store.version != STORE_VERSION {
            return Err(IoError::InvalidFormat(format!(
                "{}: unsupported version {} (want {STORE_VERSION})",
                path.display(),
                store.version
            )));
        }
        Ok(store)
    }

    /// Writes the container, creating missing parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), IoError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| IoError::file(parent, e))?;
            }
        }
        let file = File::create(path).map_err(|e| IoError::file(path, e))?;
        let mut w = BufWriter::new(file);
        serde_json::to_writer(&mut w, self)?;
        w.flush().map_err(|e| IoError::file(path, e))?;
        Ok(())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All keys starting with `prefix`, in sorted order.
    pub fn keys_with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .keys()
            .filter(move |k| k.starts_with(prefix))
            .map(|k| k.as_str())
    }

    pub fn put_array(
        &mut self,
        key: impl Into<String>,
        shape: Vec<usize>,
        data: Vec<f64>,
    ) -> Result<(), IoError> {
        let key = key.into();
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(IoError::ShapeMismatch {
                key,
                shape,
                len: data.len(),
            });
        }
        self.entries.insert(key, Entry::Array { shape, data });
        Ok(())
    }

    /// Returns `(shape, data)` of an array entry.
    pub fn get_array(&self, key: &str) -> Result<(&[usize], &[f64]), IoError> {
        match self.entries.get(key) {
            Some(Entry::Array { shape, data }) => Ok((shape, data)),
            Some(_) => Err(IoError::WrongKind {
                key: key.to_string(),
                want: "an array",
            }),
            None => Err(IoError::MissingKey(key.to_string())),
        }
    }

    pub fn put_config<T: Serialize>(&mut self, key: impl Into<String>, value: &T) -> Result<(), IoError> {
        let value = serde_json::to_value(value)?;
        self.entries.insert(key.into(), Entry::Config { value });
        Ok(())
    }

    pub fn get_config<T: DeserializeOwned>(&self, key: &str) -> Result<T, IoError> {
        match self.entries.get(key) {
            Some(Entry::Config { value }) => Ok(serde_json::from_value(value.clone())?),
            Some(_) => Err(IoError::WrongKind {
                key: key.to_string(),
                want: "a config",
            }),
            None => Err(IoError::MissingKey(key.to_string())),
        }
    }

    pub fn put_vector(&mut self, key: impl Into<String>, v: &DVector<f64>) -> Result<(), IoError> {
        self.put_array(key, vec![v.len()], v.as_slice().to_vec())
    }

    pub fn get_vector(&self, key: &str) -> Result<DVector<f64>, IoError> {
        let (shape, data) = self.get_array(key)?;
        if shape.len() != 1 {
            return Err(IoError::WrongKind {
                key: key.to_string(),
                want: "a vector",
            });
        }
        Ok(DVector::from_column_slice(data))
    }

    /// Stores a matrix row-major with shape `[rows, cols]`.
    pub fn put_matrix(&mut self, key: impl Into<String>, m: &DMatrix<f64>) -> Result<(), IoError> {
        let data: Vec<f64> = m.transpose().as_slice().to_vec();
        self.put_array(key, vec![m.nrows(), m.ncols()], data)
    }

    pub fn get_matrix(&self, key: &str) -> Result<DMatrix<f64>, IoError> {
        let (shape, data) = self.get_array(key)?;
        if shape.len() != 2 {
            return Err(IoError::WrongKind {
                key: key.to_string(),
                want: "a matrix",
            });
        }
        Ok(DMatrix::from_row_slice(shape[0], shape[1], data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct DemoConfig {
        name: String,
        x_dim: usize,
    }

    #[test]
    fn matrix_round_trip_row_major() {
        let mut store = ModelStore::new();
        let m = DMatrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        store.put_matrix("lda/T", &m).unwrap();

        let (shape, data) = store.get_array("lda/T").unwrap();
        assert_eq!(shape, &[2, 3]);
        assert_eq!(data, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(store.get_matrix("lda/T").unwrap(), m);
    }

    #[test]
    fn shape_mismatch_rejected() {
        let mut store = ModelStore::new();
        let err = store.put_array("x", vec![2, 2], vec![1.0; 3]).unwrap_err();
        assert!(matches!(err, IoError::ShapeMismatch { len: 3, .. }));
    }

    #[test]
    fn wrong_kind_and_missing() {
        let mut store = ModelStore::new();
        store
            .put_config(
                "m/config",
                &DemoConfig {
                    name: "m".into(),
                    x_dim: 3,
                },
            )
            .unwrap();
        assert!(matches!(store.get_vector("m/config"), Err(IoError::WrongKind { .. })));
        assert!(matches!(store.get_vector("m/mu"), Err(IoError::MissingKey(_))));
    }

    #[test]
    fn save_and_open_exact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/model.json");

        let mut store = ModelStore::new();
        let v = DVector::from_vec(vec![0.1, 1.0 / 3.0, -2.5e-7, std::f64::consts::PI]);
        store.put_vector("ndc/mu", &v).unwrap();
        store
            .put_config(
                "ndc/config",
                &DemoConfig {
                    name: "ndc".into(),
                    x_dim: 4,
                },
            )
            .unwrap();
        store.save(&path).unwrap();

        let loaded = ModelStore::open(&path).unwrap();
        assert_eq!(loaded, store);
        assert_eq!(loaded.get_vector("ndc/mu").unwrap(), v);
        let cfg: DemoConfig = loaded.get_config("ndc/config").unwrap();
        assert_eq!(cfg.x_dim, 4);
        assert_eq!(loaded.keys_with_prefix("ndc/").count(), 2);
    }

    #[test]
    fn open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ModelStore::open(dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, IoError::File { .. }));
    }

    #[test]
    fn open_rejects_bad_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"magic":"HNSW","version":1,"entries":{}}"#).unwrap();
        assert!(matches!(ModelStore::open(&path), Err(IoError::InvalidFormat(_))));
    }
}
