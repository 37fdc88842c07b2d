use std::collections::HashSet;
use std::path::Path;

use hyperion_io::ModelStore;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{CentWhiten, LNorm, Lda, Nda, TransformError, config_key};

/// One stage of a [`TransformList`].
#[derive(Debug, Clone, PartialEq)]
pub enum Transform {
    Lda(Lda),
    Nda(Nda),
    CentWhiten(CentWhiten),
    LNorm(LNorm),
}

impl Transform {
    pub fn name(&self) -> &str {
        match self {
            Self::Lda(t) => t.name(),
            Self::Nda(t) => t.name(),
            Self::CentWhiten(t) => t.name(),
            Self::LNorm(t) => t.name(),
        }
    }

    pub fn class_name(&self) -> &'static str {
        match self {
            Self::Lda(_) => Lda::CLASS,
            Self::Nda(_) => Nda::CLASS,
            Self::CentWhiten(_) => CentWhiten::CLASS,
            Self::LNorm(_) => LNorm::CLASS,
        }
    }

    pub fn predict(&self, x: &DMatrix<f64>) -> Result<DMatrix<f64>, TransformError> {
        match self {
            Self::Lda(t) => t.predict(x),
            Self::Nda(t) => t.predict(x),
            Self::CentWhiten(t) => t.predict(x),
            Self::LNorm(t) => t.predict(x),
        }
    }

    pub fn save_to(&self, store: &mut ModelStore) -> Result<(), TransformError> {
        match self {
            Self::Lda(t) => t.save_to(store),
            Self::Nda(t) => t.save_to(store),
            Self::CentWhiten(t) => t.save_to(store),
            Self::LNorm(t) => t.save_to(store),
        }
    }

    /// Loads the transform stored under `name`, whatever its class.
    pub fn load_from(store: &ModelStore, name: &str) -> Result<Self, TransformError> {
        let header: Header = store.get_config(&config_key(name))?;
        match header.class_name.as_str() {
            Lda::CLASS => Ok(Self::Lda(Lda::load_from(store, name)?)),
            Nda::CLASS => Ok(Self::Nda(Nda::load_from(store, name)?)),
            CentWhiten::CLASS => Ok(Self::CentWhiten(CentWhiten::load_from(store, name)?)),
            LNorm::CLASS => Ok(Self::LNorm(LNorm::load_from(store, name)?)),
            _ => Err(TransformError::UnknownClass(header.class_name)),
        }
    }
}

impl From<Lda> for Transform {
    fn from(t: Lda) -> Self {
        Self::Lda(t)
    }
}

impl From<Nda> for Transform {
    fn from(t: Nda) -> Self {
        Self::Nda(t)
    }
}

impl From<CentWhiten> for Transform {
    fn from(t: CentWhiten) -> Self {
        Self::CentWhiten(t)
    }
}

impl From<LNorm> for Transform {
    fn from(t: LNorm) -> Self {
        Self::LNorm(t)
    }
}

#[derive(Deserialize)]
struct Header {
    class_name: String,
    name: String,
}

#[derive(Serialize, Deserialize)]
struct StoredList {
    class_name: String,
    name: String,
    members: Vec<String>,
}

/// Ordered chain of transforms applied left to right.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformList {
    name: String,
    transforms: Vec<Transform>,
}

impl TransformList {
    pub const CLASS: &'static str = "TransformList";

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transforms: Vec::new(),
        }
    }

    pub fn from_transforms(name: impl Into<String>, transforms: Vec<Transform>) -> Self {
        Self {
            name: name.into(),
            transforms,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn append(&mut self, t: impl Into<Transform>) {
        self.transforms.push(t.into());
    }

    pub fn transforms(&self) -> &[Transform] {
        &self.transforms
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    pub fn predict(&self, x: &DMatrix<f64>) -> Result<DMatrix<f64>, TransformError> {
        let mut y = x.clone();
        for t in &self.transforms {
            y = t.predict(&y)?;
        }
        Ok(y)
    }

    pub fn save_to(&self, store: &mut ModelStore) -> Result<(), TransformError> {
        let mut seen = HashSet::new();
        for t in &self.transforms {
            if !seen.insert(t.name()) || t.name() == self.name {
                return Err(TransformError::Invalid(format!("duplicate transform name {:?}", t.name())));
            }
        }
        store.put_config(
            config_key(&self.name),
            &StoredList {
                class_name: Self::CLASS.to_string(),
                name: self.name.clone(),
                members: self.transforms.iter().map(|t| t.name().to_string()).collect(),
            },
        )?;
        for t in &self.transforms {
            t.save_to(store)?;
        }
        Ok(())
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), TransformError> {
        let mut store = ModelStore::new();
        self.save_to(&mut store)?;
        store.save(path.as_ref())?;
        info!(path = %path.as_ref().display(), transforms = self.len(), "saved transform list");
        Ok(())
    }

    pub fn load_from(store: &ModelStore, name: &str) -> Result<Self, TransformError> {
        let stored: StoredList = store.get_config(&config_key(name))?;
        if stored.class_name != Self::CLASS {
            return Err(TransformError::UnknownClass(stored.class_name));
        }
        let transforms = stored
            .members
            .iter()
            .map(|member| Transform::load_from(store, member))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name: stored.name,
            transforms,
        })
    }

    /// Loads the list in the file. A file holding a single transform is
    /// wrapped in a one-element list.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TransformError> {
        let store = ModelStore::open(path)?;
        let headers: Vec<Header> = store
            .keys_with_prefix("")
            .filter(|key| key.ends_with("/config"))
            .filter_map(|key| store.get_config::<Header>(key).ok())
            .collect();
        if let Some(list) = headers.iter().find(|h| h.class_name == Self::CLASS) {
            return Self::load_from(&store, &list.name);
        }
        match headers.first() {
            Some(single) => {
                let t = Transform::load_from(&store, &single.name)?;
                Ok(Self::from_transforms("transform_list", vec![t]))
            }
            None => Err(TransformError::Invalid("no transform in container".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdata::classes;

    fn lda_lnorm() -> (TransformList, DMatrix<f64>) {
        let (x, ids) = classes(5, 12, 4, 9);
        let lda = Lda::fit(&x, &ids, Some(3), "lda").unwrap();
        let mut lnorm = LNorm::new("lnorm");
        lnorm.fit(&lda.predict(&x).unwrap()).unwrap();
        let mut list = TransformList::new("transform_list");
        list.append(lda);
        list.append(lnorm);
        (list, x)
    }

    #[test]
    fn predict_chains_in_order() {
        let (list, x) = lda_lnorm();
        let y = list.predict(&x).unwrap();
        let mut manual = x.clone();
        for t in list.transforms() {
            manual = t.predict(&manual).unwrap();
        }
        assert_eq!(y, manual);
        assert_eq!(y.ncols(), 3);
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lda_lnorm.json");
        let (list, x) = lda_lnorm();
        list.save(&path).unwrap();
        let loaded = TransformList::load(&path).unwrap();
        assert_eq!(loaded, list);
        assert_eq!(loaded.predict(&x).unwrap(), list.predict(&x).unwrap());
    }

    #[test]
    fn single_transform_file_is_wrapped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cw.json");
        let (x, _) = classes(3, 6, 2, 0);
        let mut cw = CentWhiten::new("cw");
        cw.fit(&x).unwrap();
        let mut store = ModelStore::new();
        cw.save_to(&mut store).unwrap();
        store.save(&path).unwrap();
        let list = TransformList::load(&path).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list.transforms()[0].class_name(), CentWhiten::CLASS);
    }

    #[test]
    fn duplicate_names_rejected() {
        let (mut list, x) = lda_lnorm();
        let ids: Vec<usize> = (0..x.nrows()).map(|i| i % 2).collect();
        list.append(Lda::fit(&x, &ids, Some(2), "lda").unwrap());
        let mut store = ModelStore::new();
        assert!(matches!(list.save_to(&mut store), Err(TransformError::Invalid(_))));
    }
}
