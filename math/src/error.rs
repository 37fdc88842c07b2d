use thiserror::Error;

/// Errors returned by linear algebra helpers.
#[derive(Debug, Error)]
pub enum MathError {
    #[error("matrix is not square: {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },

    #[error("matrix of dimension {dim} is not positive definite")]
    NotPositiveDefinite { dim: usize },

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("empty input")]
    Empty,
}
