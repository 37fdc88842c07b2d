use hyperion_io::ModelStore;
use hyperion_math::linalg::{center_rows, length_normalize_rows, mean_rows, sym_eig_desc, symmetrize};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{TransformError, config_key};

/// Eigenvalues of the covariance are floored before inversion.
const EIG_FLOOR: f64 = 1e-10;

#[derive(Serialize, Deserialize)]
struct StoredConfig {
    class_name: String,
    name: String,
    update_mu: bool,
    update_t: bool,
}

/// Centering and whitening: `y = (x − mu) T` with `Tᵀ C T = I`.
///
/// `update_mu` and `update_t` choose which parts `fit` re-estimates; a
/// part that is not updated must already be present.
#[derive(Debug, Clone, PartialEq)]
pub struct CentWhiten {
    name: String,
    mu: Option<DVector<f64>>,
    t: Option<DMatrix<f64>>,
    update_mu: bool,
    update_t: bool,
}

impl CentWhiten {
    pub const CLASS: &'static str = "CentWhiten";

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mu: None,
            t: None,
            update_mu: true,
            update_t: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mu(&self) -> Option<&DVector<f64>> {
        self.mu.as_ref()
    }

    pub fn t(&self) -> Option<&DMatrix<f64>> {
        self.t.as_ref()
    }

    pub fn updates(&self) -> (bool, bool) {
        (self.update_mu, self.update_t)
    }

    pub fn set_updates(&mut self, update_mu: bool, update_t: bool) {
        self.update_mu = update_mu;
        self.update_t = update_t;
    }

    pub fn fit(&mut self, x: &DMatrix<f64>) -> Result<(), TransformError> {
        let mu = if self.update_mu {
            mean_rows(x)?
        } else {
            self.mu.clone().ok_or_else(|| TransformError::NotFitted(self.name.clone()))?
        };
        if mu.len() != x.ncols() {
            return Err(TransformError::DimensionMismatch {
                expected: mu.len(),
                got: x.ncols(),
            });
        }
        if self.update_t {
            let xc = center_rows(x, &mu)?;
            let mut cov = xc.transpose() * &xc / x.nrows() as f64;
            symmetrize(&mut cov);
            let (values, vectors) = sym_eig_desc(&cov)?;
            let mut t = vectors;
            for (k, mut col) in t.column_iter_mut().enumerate() {
                col /= values[k].max(EIG_FLOOR).sqrt();
            }
            self.t = Some(t);
        } else {
            match &self.t {
                None => return Err(TransformError::NotFitted(self.name.clone())),
                Some(t) if t.nrows() != x.ncols() => {
                    return Err(TransformError::DimensionMismatch {
                        expected: t.nrows(),
                        got: x.ncols(),
                    });
                }
                Some(_) => {}
            }
        }
        debug!(
            name = %self.name,
            samples = x.nrows(),
            update_mu = self.update_mu,
            update_t = self.update_t,
            "whitening fit"
        );
        self.mu = Some(mu);
        Ok(())
    }

    pub fn predict(&self, x: &DMatrix<f64>) -> Result<DMatrix<f64>, TransformError> {
        let (Some(mu), Some(t)) = (&self.mu, &self.t) else {
            return Err(TransformError::NotFitted(self.name.clone()));
        };
        if x.ncols() != mu.len() {
            return Err(TransformError::DimensionMismatch {
                expected: mu.len(),
                got: x.ncols(),
            });
        }
        Ok(center_rows(x, mu)? * t)
    }

    fn save_as(&self, store: &mut ModelStore, class_name: &str) -> Result<(), TransformError> {
        let (Some(mu), Some(t)) = (&self.mu, &self.t) else {
            return Err(TransformError::NotFitted(self.name.clone()));
        };
        store.put_config(
            config_key(&self.name),
            &StoredConfig {
                class_name: class_name.to_string(),
                name: self.name.clone(),
                update_mu: self.update_mu,
                update_t: self.update_t,
            },
        )?;
        store.put_vector(ModelStore::key(&self.name, "mu"), mu)?;
        store.put_matrix(ModelStore::key(&self.name, "T"), t)?;
        Ok(())
    }

    fn load_as(store: &ModelStore, class_name: &str, name: &str) -> Result<Self, TransformError> {
        let stored: StoredConfig = store.get_config(&config_key(name))?;
        if stored.class_name != class_name {
            return Err(TransformError::UnknownClass(stored.class_name));
        }
        let mu = store.get_vector(&ModelStore::key(name, "mu"))?;
        let t = store.get_matrix(&ModelStore::key(name, "T"))?;
        if t.nrows() != mu.len() {
            return Err(TransformError::DimensionMismatch {
                expected: mu.len(),
                got: t.nrows(),
            });
        }
        Ok(Self {
            name: stored.name,
            mu: Some(mu),
            t: Some(t),
            update_mu: stored.update_mu,
            update_t: stored.update_t,
        })
    }

    pub fn save_to(&self, store: &mut ModelStore) -> Result<(), TransformError> {
        self.save_as(store, Self::CLASS)
    }

    pub fn load_from(store: &ModelStore, name: &str) -> Result<Self, TransformError> {
        Self::load_as(store, Self::CLASS, name)
    }
}

/// Length normalization: centering and whitening, then every row scaled to
/// norm `sqrt(dim)`.
#[derive(Debug, Clone, PartialEq)]
pub struct LNorm {
    inner: CentWhiten,
}

impl LNorm {
    pub const CLASS: &'static str = "LNorm";

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: CentWhiten::new(name),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn mu(&self) -> Option<&DVector<f64>> {
        self.inner.mu()
    }

    pub fn t(&self) -> Option<&DMatrix<f64>> {
        self.inner.t()
    }

    pub fn updates(&self) -> (bool, bool) {
        self.inner.updates()
    }

    pub fn set_updates(&mut self, update_mu: bool, update_t: bool) {
        self.inner.set_updates(update_mu, update_t);
    }

    pub fn fit(&mut self, x: &DMatrix<f64>) -> Result<(), TransformError> {
        self.inner.fit(x)
    }

    pub fn predict(&self, x: &DMatrix<f64>) -> Result<DMatrix<f64>, TransformError> {
        let mut y = self.inner.predict(x)?;
        let radius = (y.ncols() as f64).sqrt();
        length_normalize_rows(&mut y, radius);
        Ok(y)
    }

    pub fn save_to(&self, store: &mut ModelStore) -> Result<(), TransformError> {
        self.inner.save_as(store, Self::CLASS)
    }

    pub fn load_from(store: &ModelStore, name: &str) -> Result<Self, TransformError> {
        Ok(Self {
            inner: CentWhiten::load_as(store, Self::CLASS, name)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdata::classes;

    #[test]
    fn whitened_covariance_is_identity() {
        let (x, _) = classes(5, 20, 3, 7);
        let mut cw = CentWhiten::new("cw");
        cw.fit(&x).unwrap();
        let y = cw.predict(&x).unwrap();
        let mu = mean_rows(&y).unwrap();
        assert!(mu.norm() < 1e-9);
        let cov = y.transpose() * &y / y.nrows() as f64;
        assert!((cov - DMatrix::<f64>::identity(3, 3)).norm() < 1e-8);
    }

    #[test]
    fn frozen_whitening_only_recenters() {
        let (x, _) = classes(5, 20, 3, 7);
        let mut cw = CentWhiten::new("cw");
        cw.fit(&x).unwrap();
        let t = cw.t().unwrap().clone();

        let shifted = x.map(|v| v + 2.0);
        cw.set_updates(true, false);
        cw.fit(&shifted).unwrap();
        assert_eq!(cw.t().unwrap(), &t);
        assert!(mean_rows(&cw.predict(&shifted).unwrap()).unwrap().norm() < 1e-9);
    }

    #[test]
    fn frozen_part_must_exist() {
        let x = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 3.0, 5.0]);
        let mut cw = CentWhiten::new("cw");
        cw.set_updates(true, false);
        assert!(matches!(cw.fit(&x), Err(TransformError::NotFitted(_))));
        assert!(matches!(CentWhiten::new("cw").predict(&x), Err(TransformError::NotFitted(_))));
    }

    #[test]
    fn lnorm_rows_have_sqrt_dim_norm() {
        let (x, _) = classes(4, 10, 4, 1);
        let mut lnorm = LNorm::new("lnorm");
        lnorm.fit(&x).unwrap();
        let y = lnorm.predict(&x).unwrap();
        for row in y.row_iter() {
            assert!((row.norm() - 2.0).abs() < 1e-9);
        }
    }

    #[test]
    fn store_round_trip() {
        let (x, _) = classes(4, 10, 3, 5);
        let mut lnorm = LNorm::new("lnorm");
        lnorm.fit(&x).unwrap();
        lnorm.set_updates(true, false);
        let mut store = ModelStore::new();
        lnorm.save_to(&mut store).unwrap();
        let loaded = LNorm::load_from(&store, "lnorm").unwrap();
        assert_eq!(loaded, lnorm);
        assert_eq!(loaded.updates(), (true, false));
        assert!(CentWhiten::load_from(&store, "lnorm").is_err());
    }
}
