use thiserror::Error;

/// Errors returned by clustering operations.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("score matrix is not square: {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },

    #[error("score matrix is empty")]
    Empty,

    #[error("score at ({row}, {col}) is not a number")]
    NotANumber { row: usize, col: usize },

    #[error("requested {requested} clusters from {items} items")]
    InvalidClusterCount { requested: usize, items: usize },

    #[error("clustering has not been fitted")]
    NotFitted,
}
