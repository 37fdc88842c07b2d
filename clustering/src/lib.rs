//! Clustering for the hyperion back-end.
//!
//! [`Ahc`] builds a dendrogram from a pairwise score matrix and cuts it into
//! flat labels. [`select_speakers`] filters diarized speakers by total
//! duration.

mod ahc;
mod error;
mod speakers;

pub use ahc::{Ahc, Criterion, Linkage, Merge, Metric};
pub use error::ClusterError;
pub use speakers::{FallbackPolicy, select_speakers};
