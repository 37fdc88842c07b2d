//! Probabilistic linear discriminant analysis.
//!
//! Three variants share one training loop and one scoring back-end:
//!
//! - [`FrPlda`]: full-rank between and within-class precisions.
//! - [`SPlda`]: low-rank speaker subspace `V` with a full within-class precision.
//! - [`Plda`]: speaker subspace `V`, channel subspace `U` and a diagonal
//!   residual, trained with a mean-field variational E-step.
//!
//! Every variant reduces to a mean plus between/within-class covariances for
//! scoring, see [`TwoCovScorer`].

mod factory;
mod frplda;
mod full;
mod scoring;
mod splda;
mod stats;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use hyperion_io::ModelStore;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::store::{config_key, find_model};
use crate::PdfError;

pub use factory::{AnyPlda, PldaFactory};
pub use frplda::{FrPlda, FrPldaParams};
pub use full::{Plda, PldaParams};
pub use scoring::TwoCovScorer;
pub use splda::{SPlda, SPldaParams};
pub use stats::TrainData;

/// Closed set of PLDA variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PldaType {
    FrPlda,
    SPlda,
    Plda,
}

impl PldaType {
    pub const ALL: [PldaType; 3] = [PldaType::FrPlda, PldaType::SPlda, PldaType::Plda];

    /// Class name written to model containers.
    pub fn class_name(self) -> &'static str {
        match self {
            Self::FrPlda => "FRPLDA",
            Self::SPlda => "SPLDA",
            Self::Plda => "PLDA",
        }
    }

    pub fn from_class_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.class_name() == name)
    }
}

impl fmt::Display for PldaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FrPlda => write!(f, "frplda"),
            Self::SPlda => write!(f, "splda"),
            Self::Plda => write!(f, "plda"),
        }
    }
}

impl FromStr for PldaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "frplda" => Ok(Self::FrPlda),
            "splda" => Ok(Self::SPlda),
            "plda" => Ok(Self::Plda),
            other => Err(format!("unknown plda type {other:?}")),
        }
    }
}

/// Which M-steps run each epoch: maximum likelihood, minimum divergence
/// or both (ML first).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MlMd {
    #[serde(rename = "ml")]
    Ml,
    #[serde(rename = "md")]
    Md,
    #[default]
    #[serde(rename = "ml+md")]
    MlMd,
}

impl MlMd {
    pub fn ml(self) -> bool {
        matches!(self, Self::Ml | Self::MlMd)
    }

    pub fn md(self) -> bool {
        matches!(self, Self::Md | Self::MlMd)
    }
}

impl fmt::Display for MlMd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ml => write!(f, "ml"),
            Self::Md => write!(f, "md"),
            Self::MlMd => write!(f, "ml+md"),
        }
    }
}

impl FromStr for MlMd {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ml" => Ok(Self::Ml),
            "md" => Ok(Self::Md),
            "ml+md" => Ok(Self::MlMd),
            other => Err(format!("unknown M-step schedule {other:?}")),
        }
    }
}

/// Training schedule for [`PldaModel::fit`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitOptions {
    pub epochs: usize,
    pub ml_md: MlMd,
    /// Zero-based epochs in which the MD step runs; `None` means every epoch.
    pub md_epochs: Option<Vec<usize>>,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            epochs: 40,
            ml_md: MlMd::MlMd,
            md_epochs: None,
        }
    }
}

impl FitOptions {
    pub fn with_epochs(epochs: usize) -> Self {
        Self {
            epochs,
            ..Default::default()
        }
    }

    fn md_at(&self, epoch: usize) -> bool {
        self.ml_md.md()
            && self
                .md_epochs
                .as_ref()
                .is_none_or(|epochs| epochs.contains(&epoch))
    }
}

/// Hyperparameters shared by all variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PldaConfig {
    pub name: String,
    /// Feature dimension; 0 until the model is trained or loaded.
    pub x_dim: usize,
    pub y_dim: usize,
    pub z_dim: usize,
}

impl PldaConfig {
    pub fn new(name: impl Into<String>, y_dim: usize, z_dim: usize) -> Self {
        Self {
            name: name.into(),
            x_dim: 0,
            y_dim,
            z_dim,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct StoredConfig {
    class_name: String,
    #[serde(flatten)]
    config: PldaConfig,
}

/// Smallest eigenvalue kept when scatter matrices are inverted at
/// initialization.
pub(crate) const SCATTER_FLOOR: f64 = 1e-5;

/// Common interface of the PLDA variants.
///
/// `fit` runs `epochs` rounds of E-step, ELBO evaluation and M-steps. A model
/// that is already initialized continues from its current parameters.
pub trait PldaModel: Clone + Sized {
    /// Posterior statistics produced by the E-step.
    type Stats;

    const TYPE: PldaType;

    fn config(&self) -> &PldaConfig;

    fn config_mut(&mut self) -> &mut PldaConfig;

    fn is_init(&self) -> bool;

    fn mu(&self) -> Result<&DVector<f64>, PdfError>;

    /// Starting point from the scatter matrices of `data`.
    fn initialize(&mut self, data: &TrainData) -> Result<(), PdfError>;

    fn estep(&self, data: &TrainData) -> Result<Self::Stats, PdfError>;

    /// Lower bound on the total log-likelihood of `data` for the posteriors
    /// in `stats`.
    fn elbo(&self, data: &TrainData, stats: &Self::Stats) -> Result<f64, PdfError>;

    fn mstep_ml(&mut self, data: &TrainData, stats: &Self::Stats) -> Result<(), PdfError>;

    fn mstep_md(&mut self, data: &TrainData, stats: &Self::Stats) -> Result<(), PdfError>;

    /// Between-class and within-class covariances.
    fn between_within(&self) -> Result<(DMatrix<f64>, DMatrix<f64>), PdfError>;

    /// New model with every component set to `w·self + (1−w)·other`.
    fn weighted_avg_model(&self, other: &Self, w_mu: f64, w_b: f64, w_w: f64) -> Result<Self, PdfError>;

    fn save_params(&self, store: &mut ModelStore) -> Result<(), PdfError>;

    fn load_params(store: &ModelStore, config: PldaConfig) -> Result<Self, PdfError>;

    fn plda_type(&self) -> PldaType {
        Self::TYPE
    }

    fn name(&self) -> &str {
        &self.config().name
    }

    fn x_dim(&self) -> usize {
        self.config().x_dim
    }

    fn y_dim(&self) -> usize {
        self.config().y_dim
    }

    fn z_dim(&self) -> usize {
        self.config().z_dim
    }

    fn fit(&mut self, x: &DMatrix<f64>, class_ids: &[usize], opts: &FitOptions) -> Result<Vec<f64>, PdfError> {
        let data = TrainData::new(x, class_ids)?;
        if self.is_init() {
            check_x_dim(self.x_dim(), x)?;
        } else {
            self.initialize(&data)?;
        }
        info!(
            name = self.name(),
            kind = %Self::TYPE,
            samples = data.num_samples(),
            classes = data.num_classes(),
            epochs = opts.epochs,
            ml_md = %opts.ml_md,
            "fitting plda"
        );

        let mut trace = Vec::with_capacity(opts.epochs);
        for epoch in 0..opts.epochs {
            let stats = self.estep(&data)?;
            let elbo = self.elbo(&data, &stats)? / data.num_samples() as f64;
            trace.push(elbo);
            debug!(epoch, elbo, "plda epoch");
            if opts.ml_md.ml() {
                self.mstep_ml(&data, &stats)?;
            }
            if opts.md_at(epoch) {
                self.mstep_md(&data, &stats)?;
            }
        }
        if let (Some(first), Some(last)) = (trace.first(), trace.last()) {
            info!(name = self.name(), first, last, "plda fit done");
        }
        Ok(trace)
    }

    fn scorer(&self) -> Result<TwoCovScorer, PdfError> {
        let (sb, sw) = self.between_within()?;
        TwoCovScorer::new(self.mu()?.clone(), sb, sw)
    }

    /// Log-likelihood ratio of every row of `x1` against every row of `x2`.
    fn llr_1vs1(&self, x1: &DMatrix<f64>, x2: &DMatrix<f64>) -> Result<DMatrix<f64>, PdfError> {
        check_x_dim(self.x_dim(), x1)?;
        check_x_dim(self.x_dim(), x2)?;
        self.scorer()?.llr_1vs1(x1, x2)
    }

    /// Log-likelihood ratio of every enrollment class of `x1` (several
    /// samples per class) against every row of `x2`.
    fn llr_nvs1(&self, x1: &DMatrix<f64>, class_ids1: &[usize], x2: &DMatrix<f64>) -> Result<DMatrix<f64>, PdfError> {
        check_x_dim(self.x_dim(), x1)?;
        check_x_dim(self.x_dim(), x2)?;
        self.scorer()?.llr_nvs1(x1, class_ids1, x2)
    }

    /// Independent deep copy.
    fn copy(&self) -> Self {
        self.clone()
    }

    fn save(&self, path: impl AsRef<Path>) -> Result<(), PdfError> {
        let mut store = ModelStore::new();
        self.save_to(&mut store)?;
        store.save(path)?;
        Ok(())
    }

    fn save_to(&self, store: &mut ModelStore) -> Result<(), PdfError> {
        if !self.is_init() {
            return Err(PdfError::NotInitialized);
        }
        store.put_config(
            config_key(self.name()),
            &StoredConfig {
                class_name: Self::TYPE.class_name().to_string(),
                config: self.config().clone(),
            },
        )?;
        self.save_params(store)
    }

    fn load(path: impl AsRef<Path>) -> Result<Self, PdfError> {
        let store = ModelStore::open(path)?;
        let (name, _) = find_model(&store, &[Self::TYPE.class_name()])?;
        Self::load_from(&store, &name)
    }

    fn load_from(store: &ModelStore, name: &str) -> Result<Self, PdfError> {
        let config = load_config(store, name)?;
        if config.0 != Self::TYPE {
            return Err(PdfError::UnknownClass(config.0.class_name().to_string()));
        }
        Self::load_params(store, config.1)
    }
}

/// Reads the variant and the hyperparameters stored under `name`.
pub(crate) fn load_config(store: &ModelStore, name: &str) -> Result<(PldaType, PldaConfig), PdfError> {
    let stored: StoredConfig = store.get_config(&config_key(name))?;
    let kind = PldaType::from_class_name(&stored.class_name)
        .ok_or_else(|| PdfError::UnknownClass(stored.class_name.clone()))?;
    Ok((kind, stored.config))
}

pub(crate) fn check_x_dim(x_dim: usize, x: &DMatrix<f64>) -> Result<(), PdfError> {
    if x.ncols() != x_dim {
        return Err(PdfError::DimensionMismatch {
            expected: x_dim,
            got: x.ncols(),
        });
    }
    Ok(())
}

pub(crate) fn check_latent_dim(what: &'static str, dim: usize, x_dim: usize) -> Result<(), PdfError> {
    if dim > x_dim {
        return Err(PdfError::LatentDimTooLarge { what, dim, x_dim });
    }
    Ok(())
}

/// Checks that two models can be averaged and that the weights are convex.
pub(crate) fn check_avg_compatible(a: &PldaConfig, b: &PldaConfig, weights: [f64; 3]) -> Result<(), PdfError> {
    for (expected, got) in [(a.x_dim, b.x_dim), (a.y_dim, b.y_dim), (a.z_dim, b.z_dim)] {
        if expected != got {
            return Err(PdfError::DimensionMismatch { expected, got });
        }
    }
    if let Some(w) = weights.iter().find(|w| !(0.0..=1.0).contains(*w)) {
        return Err(PdfError::Validation(format!("averaging weight {w} outside [0, 1]")));
    }
    Ok(())
}

/// `w·a + (1−w)·b`, returning `a` or `b` untouched at the end points.
pub(crate) fn blend_vector(a: &DVector<f64>, b: &DVector<f64>, w: f64) -> DVector<f64> {
    if w == 1.0 {
        a.clone()
    } else if w == 0.0 {
        b.clone()
    } else {
        a * w + b * (1.0 - w)
    }
}

pub(crate) fn blend_matrix(a: &DMatrix<f64>, b: &DMatrix<f64>, w: f64) -> DMatrix<f64> {
    if w == 1.0 {
        a.clone()
    } else if w == 0.0 {
        b.clone()
    } else {
        a * w + b * (1.0 - w)
    }
}

#[cfg(test)]
pub(crate) mod testdata {
    use nalgebra::DMatrix;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand_distr::{Distribution, Normal};

    /// `num_classes` well separated classes of `per_class` samples in `dim`
    /// dimensions. Returns the data and the class of each row.
    pub(crate) fn classes(num_classes: usize, per_class: usize, dim: usize, seed: u64) -> (DMatrix<f64>, Vec<usize>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let between = Normal::new(0.0, 3.0).unwrap();
        let within = Normal::new(0.0, 1.0).unwrap();
        let n = num_classes * per_class;
        let mut x = DMatrix::zeros(n, dim);
        let mut ids = Vec::with_capacity(n);
        for c in 0..num_classes {
            let center: Vec<f64> = (0..dim).map(|_| between.sample(&mut rng)).collect();
            for k in 0..per_class {
                let row = c * per_class + k;
                for j in 0..dim {
                    x[(row, j)] = center[j] + within.sample(&mut rng);
                }
                ids.push(c);
            }
        }
        (x, ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plda_type_strings() {
        for t in PldaType::ALL {
            assert_eq!(t.to_string().parse::<PldaType>().unwrap(), t);
            assert_eq!(PldaType::from_class_name(t.class_name()), Some(t));
        }
        assert_eq!("SPLDA".parse::<PldaType>().unwrap(), PldaType::SPlda);
        assert!("lda".parse::<PldaType>().is_err());
    }

    #[test]
    fn ml_md_schedule() {
        assert_eq!("ml+md".parse::<MlMd>().unwrap(), MlMd::MlMd);
        assert!(MlMd::Ml.ml() && !MlMd::Ml.md());
        assert!(!MlMd::Md.ml() && MlMd::Md.md());
        assert!("md+ml".parse::<MlMd>().is_err());

        let opts = FitOptions {
            epochs: 5,
            ml_md: MlMd::MlMd,
            md_epochs: Some(vec![1, 3]),
        };
        let md: Vec<usize> = (0..5).filter(|&e| opts.md_at(e)).collect();
        assert_eq!(md, vec![1, 3]);

        let ml_only = FitOptions {
            ml_md: MlMd::Ml,
            ..FitOptions::default()
        };
        assert!(!ml_only.md_at(0));
    }

    #[test]
    fn blend_end_points_are_exact() {
        let a = DVector::from_vec(vec![0.1, 0.7]);
        let b = DVector::from_vec(vec![1.0 / 3.0, -5.0]);
        assert_eq!(blend_vector(&a, &b, 1.0), a);
        assert_eq!(blend_vector(&a, &b, 0.0), b);
        let mid = blend_vector(&a, &b, 0.5);
        assert!((mid[1] + 2.15).abs() < 1e-12);
    }

    #[test]
    fn avg_weight_out_of_range() {
        let c = PldaConfig::new("a", 2, 0);
        let err = check_avg_compatible(&c, &c, [1.0, 1.5, 0.0]).unwrap_err();
        assert!(matches!(err, PdfError::Validation(_)));
        let mut d = c.clone();
        d.y_dim = 3;
        assert!(matches!(
            check_avg_compatible(&c, &d, [1.0; 3]),
            Err(PdfError::DimensionMismatch { expected: 2, got: 3 })
        ));
    }
}
