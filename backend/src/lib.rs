//! Training pipelines of the hyperion back-end.
//!
//! - [`train_be`]: LDA, length normalization and PLDA on out-of-domain data,
//!   then adaptation to in-domain data with optional AHC relabelling.
//! - [`train_nda`]: nearest-neighbour discriminant analysis.
//!
//! Both take their settings from [`config`], loadable from YAML.

pub mod config;
mod train_be;
mod train_nda;

pub use config::{AdaptWeights, PldaTrainConfig, TrainBeConfig, TrainNdaConfig, load_yaml};
pub use train_be::{TrainBeOutput, train_be};
pub use train_nda::train_nda;
