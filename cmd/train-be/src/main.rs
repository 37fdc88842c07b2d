//! train-be - trains the LDA + LNorm + PLDA back-end and adapts it to
//! in-domain data.

use std::path::PathBuf;

use anyhow::ensure;
use clap::Parser;
use hyperion_backend::{TrainBeConfig, load_yaml, train_be};
use hyperion_io::SpcPruningMode;
use hyperion_pdfs::{MlMd, PldaType};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Train back-end for speaker verification with in-domain adaptation.
///
/// Settings come from `--config` (YAML) when given; flags override them.
#[derive(Parser)]
#[command(name = "train-be")]
#[command(version)]
struct Cli {
    /// YAML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Training vector archive
    #[arg(long)]
    iv_file: Option<PathBuf>,

    /// Training `utt speaker` list
    #[arg(long)]
    train_list: Option<PathBuf>,

    /// Adaptation vector archive
    #[arg(long)]
    adapt_iv_file: Option<PathBuf>,

    /// Adaptation `utt speaker` list
    #[arg(long)]
    adapt_list: Option<PathBuf>,

    /// Output directory
    #[arg(long)]
    output_path: Option<PathBuf>,

    #[arg(long)]
    lda_dim: Option<usize>,

    /// frplda, splda or plda
    #[arg(long)]
    plda_type: Option<PldaType>,

    #[arg(long)]
    y_dim: Option<usize>,

    #[arg(long)]
    z_dim: Option<usize>,

    #[arg(long)]
    epochs: Option<usize>,

    /// ml, md or ml+md
    #[arg(long)]
    ml_md: Option<MlMd>,

    /// Zero-based epochs that run the MD step
    #[arg(long, num_args = 1..)]
    md_epochs: Option<Vec<usize>>,

    /// Epochs of continued training on the adaptation data
    #[arg(long)]
    adapt_epochs: Option<usize>,

    /// Weights of the out-of-domain PLDA in `plda_adapt1` (1 keeps it).
    #[arg(long)]
    w_mu1: Option<f64>,
    #[arg(long)]
    w_b1: Option<f64>,
    #[arg(long)]
    w_w1: Option<f64>,
    /// Weights of the out-of-domain PLDA in `plda_adapt2`.
    #[arg(long)]
    w_mu2: Option<f64>,
    #[arg(long)]
    w_b2: Option<f64>,
    #[arg(long)]
    w_w2: Option<f64>,

    /// Clusters for the AHC relabelling of the adaptation data
    #[arg(long)]
    num_spks: Option<usize>,

    /// Run AHC on the adaptation data and refit
    #[arg(long)]
    do_ahc: bool,

    /// Minimum samples per class
    #[arg(long)]
    min_spc: Option<usize>,

    /// Maximum samples per class
    #[arg(long)]
    max_spc: Option<usize>,

    /// first, last or random
    #[arg(long)]
    spc_pruning_mode: Option<SpcPruningMode>,

    #[arg(long)]
    vcr_seed: Option<u64>,

    /// Verbose output
    #[arg(short = 'v', long)]
    verbose: bool,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<TrainBeConfig> {
        let mut cfg: TrainBeConfig = match &self.config {
            Some(path) => load_yaml(path)?,
            None => TrainBeConfig::default(),
        };
        macro_rules! set {
            ($($field:expr => $value:expr),* $(,)?) => {
                $(if let Some(v) = $value { $field = v; })*
            };
        }
        set! {
            cfg.iv_file => self.iv_file,
            cfg.train_list => self.train_list,
            cfg.adapt_iv_file => self.adapt_iv_file,
            cfg.adapt_list => self.adapt_list,
            cfg.output_path => self.output_path,
            cfg.lda_dim => self.lda_dim,
            cfg.plda.plda_type => self.plda_type,
            cfg.plda.y_dim => self.y_dim,
            cfg.plda.z_dim => self.z_dim,
            cfg.plda.epochs => self.epochs,
            cfg.plda.ml_md => self.ml_md,
            cfg.plda.md_epochs => self.md_epochs,
            cfg.adapt_epochs => self.adapt_epochs,
            cfg.adapt1.w_mu => self.w_mu1,
            cfg.adapt1.w_b => self.w_b1,
            cfg.adapt1.w_w => self.w_w1,
            cfg.adapt2.w_mu => self.w_mu2,
            cfg.adapt2.w_b => self.w_b2,
            cfg.adapt2.w_w => self.w_w2,
            cfg.num_spks => self.num_spks,
            cfg.reader.min_spc => self.min_spc,
            cfg.reader.spc_pruning_mode => self.spc_pruning_mode,
            cfg.reader.seed => self.vcr_seed,
        }
        if self.max_spc.is_some() {
            cfg.reader.max_spc = self.max_spc;
        }
        cfg.do_ahc |= self.do_ahc;

        for (flag, path) in [
            ("--iv-file", &cfg.iv_file),
            ("--train-list", &cfg.train_list),
            ("--adapt-iv-file", &cfg.adapt_iv_file),
            ("--adapt-list", &cfg.adapt_list),
            ("--output-path", &cfg.output_path),
        ] {
            ensure!(!path.as_os_str().is_empty(), "{flag} is required");
        }
        Ok(cfg)
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_target(false)
        .init();

    let cfg = cli.into_config()?;
    let out = train_be(&cfg)?;
    info!(
        output = %cfg.output_path.display(),
        final_elbo = out.elbo.last().copied().unwrap_or(f64::NAN),
        ahc = out.adapt_labels.is_some(),
        "back-end trained"
    );
    Ok(())
}
