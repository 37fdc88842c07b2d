//! Persistence and list handling for the hyperion back-end.
//!
//! - [`ModelStore`]: keyed container holding float arrays and JSON
//!   configuration, namespaced by model name (`"plda/mu"`, `"plda/config"`).
//! - [`Utt2Info`]: ordered two-column utterance lists (`utt2spk`, scp files).
//! - [`VectorArchive`]: Kaldi-style text archives of per-utterance vectors.
//! - [`VectorClassReader`]: vectors plus dense class ids, with per-class pruning.
//! - [`write_elbo_table`]: `epoch,value` tables for training diagnostics.

mod archive;
mod class_reader;
mod error;
mod model_store;
mod table;
mod utt2info;

pub use archive::VectorArchive;
pub use class_reader::{ClassData, ClassReaderOptions, SpcPruningMode, VectorClassReader};
pub use error::IoError;
pub use model_store::{Entry, ModelStore};
pub use table::write_elbo_table;
pub use utt2info::Utt2Info;
