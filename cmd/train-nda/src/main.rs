//! train-nda - trains a nearest-neighbour discriminant analysis transform.

use std::path::PathBuf;

use anyhow::ensure;
use clap::Parser;
use hyperion_backend::{TrainNdaConfig, load_yaml, train_nda};
use hyperion_io::SpcPruningMode;
use tracing_subscriber::EnvFilter;

/// Train NDA.
///
/// Settings come from `--config` (YAML) when given; flags override them.
#[derive(Parser)]
#[command(name = "train-nda")]
#[command(version)]
struct Cli {
    /// YAML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Vector archive
    #[arg(long)]
    iv_file: Option<PathBuf>,

    /// `utt class` list
    #[arg(long)]
    train_list: Option<PathBuf>,

    /// Transform list applied before NDA
    #[arg(long)]
    preproc_file: Option<PathBuf>,

    /// Output model file
    #[arg(long)]
    output_path: Option<PathBuf>,

    #[arg(long)]
    nda_dim: Option<usize>,

    /// Nearest class means per class
    #[arg(long)]
    k: Option<usize>,

    #[arg(long)]
    alpha: Option<f64>,

    /// Model name inside the output file
    #[arg(long)]
    name: Option<String>,

    /// Save the bare NDA instead of a transform list
    #[arg(long)]
    no_save_tlist: bool,

    /// Start a new transform list instead of appending to the preproc
    #[arg(long)]
    no_append_tlist: bool,

    #[arg(long)]
    min_spc: Option<usize>,

    #[arg(long)]
    max_spc: Option<usize>,

    /// first, last or random
    #[arg(long)]
    spc_pruning_mode: Option<SpcPruningMode>,

    #[arg(long)]
    vcr_seed: Option<u64>,

    /// Column separator of the class list
    #[arg(long)]
    scp_sep: Option<String>,

    /// Verbose output
    #[arg(short = 'v', long)]
    verbose: bool,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<TrainNdaConfig> {
        let mut cfg: TrainNdaConfig = match &self.config {
            Some(path) => load_yaml(path)?,
            None => TrainNdaConfig::default(),
        };
        if let Some(v) = self.iv_file {
            cfg.iv_file = v;
        }
        if let Some(v) = self.train_list {
            cfg.train_list = v;
        }
        if self.preproc_file.is_some() {
            cfg.preproc_file = self.preproc_file;
        }
        if let Some(v) = self.output_path {
            cfg.output_path = v;
        }
        if self.nda_dim.is_some() {
            cfg.nda_dim = self.nda_dim;
        }
        if let Some(v) = self.k {
            cfg.k = v;
        }
        if let Some(v) = self.alpha {
            cfg.alpha = v;
        }
        if let Some(v) = self.name {
            cfg.name = v;
        }
        if let Some(v) = self.min_spc {
            cfg.reader.min_spc = v;
        }
        if self.max_spc.is_some() {
            cfg.reader.max_spc = self.max_spc;
        }
        if let Some(v) = self.spc_pruning_mode {
            cfg.reader.spc_pruning_mode = v;
        }
        if let Some(v) = self.vcr_seed {
            cfg.reader.seed = v;
        }
        if self.scp_sep.is_some() {
            cfg.reader.sep = self.scp_sep;
        }
        cfg.save_tlist &= !self.no_save_tlist;
        cfg.append_tlist &= !self.no_append_tlist;

        ensure!(!cfg.iv_file.as_os_str().is_empty(), "--iv-file is required");
        ensure!(!cfg.train_list.as_os_str().is_empty(), "--train-list is required");
        ensure!(!cfg.output_path.as_os_str().is_empty(), "--output-path is required");
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
    train_nda(&cfg)
}
