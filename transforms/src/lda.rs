use hyperion_io::ModelStore;
use hyperion_math::linalg::{center_rows, floor_eigenvalues, gen_eig_desc};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{NSbSw, SbSw, TransformError, config_key};

/// Smallest eigenvalue of the within-class scatter before the generalized
/// eigenproblem.
const SW_FLOOR: f64 = 1e-8;

/// Affine projection `y = (x − mu) T`.
#[derive(Debug, Clone, PartialEq)]
struct Projection {
    mu: DVector<f64>,
    /// `in_dim × out_dim`.
    t: DMatrix<f64>,
}

#[derive(Serialize, Deserialize)]
struct StoredConfig {
    class_name: String,
    name: String,
}

impl Projection {
    /// Top `out_dim` solutions of `Sb v = λ Sw v`. `None` keeps every
    /// direction.
    fn from_scatter(scatter: &SbSw, out_dim: Option<usize>) -> Result<Self, TransformError> {
        let in_dim = scatter.mu.len();
        let out_dim = out_dim.unwrap_or(in_dim);
        if out_dim == 0 || out_dim > in_dim {
            return Err(TransformError::InvalidDim {
                dim: out_dim,
                max: in_dim,
            });
        }
        let sw = floor_eigenvalues(&scatter.sw, SW_FLOOR)?;
        let (values, vectors) = gen_eig_desc(&scatter.sb, &sw)?;
        debug!(
            leading = values[0],
            last_kept = values[out_dim - 1],
            out_dim,
            "discriminant eigenvalues"
        );
        Ok(Self {
            mu: scatter.mu.clone(),
            t: vectors.columns(0, out_dim).into_owned(),
        })
    }

    fn predict(&self, x: &DMatrix<f64>) -> Result<DMatrix<f64>, TransformError> {
        if x.ncols() != self.mu.len() {
            return Err(TransformError::DimensionMismatch {
                expected: self.mu.len(),
                got: x.ncols(),
            });
        }
        Ok(center_rows(x, &self.mu)? * &self.t)
    }

    fn save_to(&self, store: &mut ModelStore, class_name: &str, name: &str) -> Result<(), TransformError> {
        store.put_config(
            config_key(name),
            &StoredConfig {
                class_name: class_name.to_string(),
                name: name.to_string(),
            },
        )?;
        store.put_vector(ModelStore::key(name, "mu"), &self.mu)?;
        store.put_matrix(ModelStore::key(name, "T"), &self.t)?;
        Ok(())
    }

    fn load_from(store: &ModelStore, class_name: &str, name: &str) -> Result<Self, TransformError> {
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
        Ok(Self { mu, t })
    }
}

/// Linear discriminant analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct Lda {
    name: String,
    proj: Projection,
}

impl Lda {
    pub const CLASS: &'static str = "LDA";

    pub fn fit(
        x: &DMatrix<f64>,
        class_ids: &[usize],
        lda_dim: Option<usize>,
        name: impl Into<String>,
    ) -> Result<Self, TransformError> {
        let scatter = SbSw::fit(x, class_ids)?;
        Self::from_scatter(&scatter, lda_dim, name)
    }

    pub fn from_scatter(scatter: &SbSw, lda_dim: Option<usize>, name: impl Into<String>) -> Result<Self, TransformError> {
        Ok(Self {
            name: name.into(),
            proj: Projection::from_scatter(scatter, lda_dim)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mu(&self) -> &DVector<f64> {
        &self.proj.mu
    }

    pub fn t(&self) -> &DMatrix<f64> {
        &self.proj.t
    }

    pub fn in_dim(&self) -> usize {
        self.proj.t.nrows()
    }

    pub fn out_dim(&self) -> usize {
        self.proj.t.ncols()
    }

    pub fn predict(&self, x: &DMatrix<f64>) -> Result<DMatrix<f64>, TransformError> {
        self.proj.predict(x)
    }

    pub fn save_to(&self, store: &mut ModelStore) -> Result<(), TransformError> {
        self.proj.save_to(store, Self::CLASS, &self.name)
    }

    pub fn load_from(store: &ModelStore, name: &str) -> Result<Self, TransformError> {
        Ok(Self {
            name: name.to_string(),
            proj: Projection::load_from(store, Self::CLASS, name)?,
        })
    }
}

/// Nearest-neighbour discriminant analysis, an LDA driven by [`NSbSw`]
/// scatter.
#[derive(Debug, Clone, PartialEq)]
pub struct Nda {
    name: String,
    proj: Projection,
}

impl Nda {
    pub const CLASS: &'static str = "NDA";

    pub fn fit(
        x: &DMatrix<f64>,
        class_ids: &[usize],
        scatter: NSbSw,
        nda_dim: Option<usize>,
        name: impl Into<String>,
    ) -> Result<Self, TransformError> {
        let scatter = scatter.fit(x, class_ids)?;
        Self::from_scatter(&scatter, nda_dim, name)
    }

    pub fn from_scatter(scatter: &SbSw, nda_dim: Option<usize>, name: impl Into<String>) -> Result<Self, TransformError> {
        Ok(Self {
            name: name.into(),
            proj: Projection::from_scatter(scatter, nda_dim)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mu(&self) -> &DVector<f64> {
        &self.proj.mu
    }

    pub fn t(&self) -> &DMatrix<f64> {
        &self.proj.t
    }

    pub fn in_dim(&self) -> usize {
        self.proj.t.nrows()
    }

    pub fn out_dim(&self) -> usize {
        self.proj.t.ncols()
    }

    pub fn predict(&self, x: &DMatrix<f64>) -> Result<DMatrix<f64>, TransformError> {
        self.proj.predict(x)
    }

    pub fn save_to(&self, store: &mut ModelStore) -> Result<(), TransformError> {
        self.proj.save_to(store, Self::CLASS, &self.name)
    }

    pub fn load_from(store: &ModelStore, name: &str) -> Result<Self, TransformError> {
        Ok(Self {
            name: name.to_string(),
            proj: Projection::load_from(store, Self::CLASS, name)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdata::classes;

    #[test]
    fn lda_whitens_within_class() {
        let (x, ids) = classes(6, 20, 4, 3);
        let lda = Lda::fit(&x, &ids, Some(3), "lda").unwrap();
        assert_eq!((lda.in_dim(), lda.out_dim()), (4, 3));
        let y = lda.predict(&x).unwrap();
        let projected = SbSw::fit(&y, &ids).unwrap();
        // directions are Sw-orthonormal
        let eye = DMatrix::<f64>::identity(3, 3);
        assert!((projected.sw - eye).norm() < 1e-6);
        // eigenvalues come out in descending order
        let sb = projected.sb;
        assert!(sb[(0, 0)] >= sb[(1, 1)] && sb[(1, 1)] >= sb[(2, 2)]);
        assert!(projected.mu.norm() < 1e-9);
    }

    #[test]
    fn output_dim_checked() {
        let (x, ids) = classes(3, 5, 2, 1);
        assert!(matches!(
            Lda::fit(&x, &ids, Some(3), "lda"),
            Err(TransformError::InvalidDim { dim: 3, max: 2 })
        ));
        assert_eq!(Lda::fit(&x, &ids, None, "lda").unwrap().out_dim(), 2);
        let lda = Lda::fit(&x, &ids, Some(1), "lda").unwrap();
        assert!(matches!(
            lda.predict(&DMatrix::zeros(1, 3)),
            Err(TransformError::DimensionMismatch { expected: 2, got: 3 })
        ));
    }

    #[test]
    fn nda_projects() {
        let (x, ids) = classes(8, 10, 5, 4);
        let nda = Nda::fit(&x, &ids, NSbSw::new(3, 1.0), Some(2), "nda").unwrap();
        assert_eq!(nda.predict(&x).unwrap().shape(), (80, 2));
    }

    #[test]
    fn store_round_trip() {
        let (x, ids) = classes(4, 6, 3, 2);
        let lda = Lda::fit(&x, &ids, Some(2), "lda").unwrap();
        let mut store = ModelStore::new();
        lda.save_to(&mut store).unwrap();
        assert_eq!(Lda::load_from(&store, "lda").unwrap(), lda);
        assert!(matches!(
            Nda::load_from(&store, "lda"),
            Err(TransformError::UnknownClass(_))
        ));
    }
}
