//! Probability densities for the hyperion back-end.
//!
//! - [`ExpFamily`]: natural-parameter interface with EM-style `fit`.
//! - [`NormalDiagCov`]: diagonal-covariance Gaussian.
//! - [`plda`]: PLDA variants, training, scoring, averaging and persistence.

mod error;
pub mod exp_family;
pub mod normal_diag_cov;
pub mod plda;
mod store;

pub use error::PdfError;
pub use exp_family::ExpFamily;
pub use normal_diag_cov::{DiagGaussParams, NORMAL_DIAG_COV_CLASS, NormalDiagCov, NormalDiagCovConfig};
pub use plda::{
    AnyPlda, FitOptions, FrPlda, MlMd, Plda, PldaConfig, PldaFactory, PldaModel, PldaType, SPlda, TwoCovScorer,
    TrainData,
};
