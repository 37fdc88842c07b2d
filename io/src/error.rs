use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by hyperion I/O operations.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("{}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing key: {0}")]
    MissingKey(String),

    #[error("entry {key} is not {want}")]
    WrongKind { key: String, want: &'static str },

    #[error("entry {key}: shape {shape:?} does not hold {len} values")]
    ShapeMismatch {
        key: String,
        shape: Vec<usize>,
        len: usize,
    },

    #[error("invalid format: {0}")]
    InvalidFormat(String),
}

impl IoError {
    pub(crate) fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::File {
            path: path.into(),
            source,
        }
    }
}
