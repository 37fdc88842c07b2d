//! YAML configuration for the training pipelines.
//!
//! Every field has a default, so a config file only lists what it changes.
//! Command line flags are applied on top by the binaries.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use hyperion_io::ClassReaderOptions;
use hyperion_pdfs::{FitOptions, MlMd, PldaType};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Reads a YAML config file.
pub fn load_yaml<T: DeserializeOwned>(path: impl AsRef<Path>) -> anyhow::Result<T> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    serde_yaml::from_str(&content).with_context(|| format!("parse config {}", path.display()))
}

/// PLDA hyperparameters and training schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PldaTrainConfig {
    pub plda_type: PldaType,
    pub y_dim: usize,
    pub z_dim: usize,
    pub epochs: usize,
    pub ml_md: MlMd,
    /// Zero-based epochs that run the MD step; empty means every epoch.
    pub md_epochs: Vec<usize>,
}

impl Default for PldaTrainConfig {
    fn default() -> Self {
        Self {
            plda_type: PldaType::SPlda,
            y_dim: 150,
            z_dim: 400,
            epochs: 40,
            ml_md: MlMd::MlMd,
            md_epochs: Vec::new(),
        }
    }
}

impl PldaTrainConfig {
    pub fn fit_options(&self) -> FitOptions {
        FitOptions {
            epochs: self.epochs,
            ml_md: self.ml_md,
            md_epochs: (!self.md_epochs.is_empty()).then(|| self.md_epochs.clone()),
        }
    }
}

/// Interpolation weights of one adaptation stage, applied as
/// `w·original + (1 − w)·adapted`. The default of 1 keeps the
/// out-of-domain model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptWeights {
    pub w_mu: f64,
    pub w_b: f64,
    pub w_w: f64,
}

impl Default for AdaptWeights {
    fn default() -> Self {
        Self {
            w_mu: 1.0,
            w_b: 1.0,
            w_w: 1.0,
        }
    }
}

/// Settings for [`crate::train_be`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainBeConfig {
    /// Training vector archive.
    pub iv_file: PathBuf,
    /// `utt class` list for training.
    pub train_list: PathBuf,
    pub adapt_iv_file: PathBuf,
    pub adapt_list: PathBuf,
    pub output_path: PathBuf,
    pub reader: ClassReaderOptions,
    pub lda_dim: usize,
    pub plda: PldaTrainConfig,
    /// Epochs of continued training on the adaptation data.
    pub adapt_epochs: usize,
    pub adapt1: AdaptWeights,
    pub adapt2: AdaptWeights,
    /// Cluster the adaptation data and refit on the cluster labels.
    pub do_ahc: bool,
    pub num_spks: usize,
}

impl Default for TrainBeConfig {
    fn default() -> Self {
        Self {
            iv_file: PathBuf::new(),
            train_list: PathBuf::new(),
            adapt_iv_file: PathBuf::new(),
            adapt_list: PathBuf::new(),
            output_path: PathBuf::new(),
            reader: ClassReaderOptions::default(),
            lda_dim: 150,
            plda: PldaTrainConfig::default(),
            adapt_epochs: 20,
            adapt1: AdaptWeights::default(),
            adapt2: AdaptWeights::default(),
            do_ahc: false,
            num_spks: 1000,
        }
    }
}

/// Settings for [`crate::train_nda`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainNdaConfig {
    pub iv_file: PathBuf,
    pub train_list: PathBuf,
    /// Transform list applied to the vectors before NDA.
    pub preproc_file: Option<PathBuf>,
    pub output_path: PathBuf,
    pub reader: ClassReaderOptions,
    /// `None` keeps every direction.
    pub nda_dim: Option<usize>,
    /// Nearest class means per class.
    pub k: usize,
    pub alpha: f64,
    pub name: String,
    /// Save a transform list rather than the bare NDA.
    pub save_tlist: bool,
    /// Append the NDA to the preprocessing list when there is one.
    pub append_tlist: bool,
}

impl Default for TrainNdaConfig {
    fn default() -> Self {
        Self {
            iv_file: PathBuf::new(),
            train_list: PathBuf::new(),
            preproc_file: None,
            output_path: PathBuf::new(),
            reader: ClassReaderOptions::default(),
            nda_dim: None,
            k: 10,
            alpha: 1.0,
            name: "nda".to_string(),
            save_tlist: true,
            append_tlist: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let cfg: TrainBeConfig = serde_yaml::from_str(
            "iv_file: train.ark\nlda_dim: 20\nplda:\n  plda_type: frplda\n  ml_md: ml\nadapt1:\n  w_mu: 0.5\n",
        )
        .unwrap();
        assert_eq!(cfg.iv_file, PathBuf::from("train.ark"));
        assert_eq!(cfg.lda_dim, 20);
        assert_eq!(cfg.plda.plda_type, PldaType::FrPlda);
        assert_eq!(cfg.plda.ml_md, MlMd::Ml);
        assert_eq!(cfg.plda.y_dim, 150);
        assert_eq!(cfg.adapt1, AdaptWeights { w_mu: 0.5, w_b: 1.0, w_w: 1.0 });
        assert_eq!(cfg.adapt_epochs, 20);
        assert_eq!(cfg.num_spks, 1000);
        assert!(!cfg.do_ahc);
    }

    #[test]
    fn md_epochs_schedule() {
        let mut plda = PldaTrainConfig::default();
        assert_eq!(plda.fit_options().md_epochs, None);
        plda.md_epochs = vec![0, 2];
        assert_eq!(plda.fit_options().md_epochs, Some(vec![0, 2]));
        assert_eq!(plda.fit_options().epochs, 40);
    }

    #[test]
    fn nda_defaults() {
        let cfg: TrainNdaConfig = serde_yaml::from_str("k: 5\n").unwrap();
        assert_eq!(cfg.k, 5);
        assert_eq!(cfg.alpha, 1.0);
        assert_eq!(cfg.name, "nda");
        assert!(cfg.save_tlist && cfg.append_tlist);
    }

    #[test]
    fn load_reports_path() {
        let err = load_yaml::<TrainNdaConfig>("/nonexistent/train_nda.yaml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/train_nda.yaml"));
    }
}
