use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use hyperion_math::ClassIndex;
use nalgebra::DMatrix;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{IoError, Utt2Info, VectorArchive};

/// Which samples survive when a class has more than `max_spc` samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpcPruningMode {
    #[default]
    First,
    Last,
    Random,
}

impl fmt::Display for SpcPruningMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::First => write!(f, "first"),
            Self::Last => write!(f, "last"),
            Self::Random => write!(f, "random"),
        }
    }
}

impl FromStr for SpcPruningMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first" => Ok(Self::First),
            "last" => Ok(Self::Last),
            "random" => Ok(Self::Random),
            other => Err(format!("unknown pruning mode {other:?}")),
        }
    }
}

/// Per-class sample filtering applied before vectors are loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassReaderOptions {
    /// Classes with fewer samples are dropped.
    pub min_spc: usize,
    /// Classes with more samples are pruned down to this many.
    pub max_spc: Option<usize>,
    pub spc_pruning_mode: SpcPruningMode,
    /// Seed for [`SpcPruningMode::Random`].
    pub seed: u64,
    /// Column separator of the class list; `None` splits on whitespace.
    pub sep: Option<String>,
}

impl Default for ClassReaderOptions {
    fn default() -> Self {
        Self {
            min_spc: 1,
            max_spc: None,
            spc_pruning_mode: SpcPruningMode::First,
            seed: 1024,
            sep: None,
        }
    }
}

/// Vectors with their class labels, ready for supervised training.
#[derive(Debug, Clone)]
pub struct ClassData {
    /// Utterance keys, one per row of `x`.
    pub keys: Vec<String>,
    pub x: DMatrix<f64>,
    /// Dense class id per row.
    pub class_ids: Vec<usize>,
    /// `class_names[id]` is the original label of class `id`.
    pub class_names: Vec<String>,
}

impl ClassData {
    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }
}

/// Reads a vector archive restricted to the utterances of a class list
/// (`utt class` per line).
pub struct VectorClassReader {
    archive: PathBuf,
    list: PathBuf,
    opts: ClassReaderOptions,
}

impl VectorClassReader {
    pub fn new(archive: impl Into<PathBuf>, list: impl Into<PathBuf>, opts: ClassReaderOptions) -> Self {
        Self {
            archive: archive.into(),
            list: list.into(),
            opts,
        }
    }

    pub fn read(&self) -> Result<ClassData, IoError> {
        let u2c = Utt2Info::load(&self.list, self.opts.sep.as_deref())?;
        let u2c = prune_classes(&u2c, &self.opts);
        if u2c.is_empty() {
            return Err(IoError::InvalidFormat(format!(
                "{}: no utterances left after class pruning",
                self.list.display()
            )));
        }

        let archive = VectorArchive::open(&self.archive)?;
        let x = archive.read(u2c.key())?;
        let index = ClassIndex::from_labels(u2c.info());
        info!(
            samples = x.nrows(),
            dim = x.ncols(),
            classes = index.num_classes(),
            "read class vectors"
        );
        Ok(ClassData {
            keys: u2c.key().to_vec(),
            x,
            class_ids: index.ids().to_vec(),
            class_names: index.names().to_vec(),
        })
    }
}

/// Applies `min_spc` / `max_spc` to a class list, keeping list order.
pub(crate) fn prune_classes(u2c: &Utt2Info, opts: &ClassReaderOptions) -> Utt2Info {
    let mut members: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, (_, class)) in u2c.iter().enumerate() {
        members.entry(class).or_default().push(i);
    }

    let mut rng = StdRng::seed_from_u64(opts.seed);
    let mut keep: Vec<usize> = Vec::with_capacity(u2c.len());
    let mut dropped = 0usize;
    for (_, mut idx) in members {
        if idx.len() < opts.min_spc {
            dropped += 1;
            continue;
        }
        if let Some(max) = opts.max_spc {
            if idx.len() > max {
                match opts.spc_pruning_mode {
                    SpcPruningMode::First => idx.truncate(max),
                    SpcPruningMode::Last => {
                        idx.drain(..idx.len() - max);
                    }
                    SpcPruningMode::Random => {
                        idx.shuffle(&mut rng);
                        idx.truncate(max);
                    }
                }
            }
        }
        keep.extend(idx);
    }
    if dropped > 0 {
        debug!(dropped, min_spc = opts.min_spc, "dropped small classes");
    }
    keep.sort_unstable();
    u2c.select(&keep)
}
