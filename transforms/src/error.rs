use hyperion_io::IoError;
use hyperion_math::MathError;
use thiserror::Error;

/// Errors returned by scatter statistics and feature transforms.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error(transparent)]
    Math(#[from] MathError),

    #[error(transparent)]
    Io(#[from] IoError),

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("{labels} class ids for {samples} samples")]
    LabelCountMismatch { labels: usize, samples: usize },

    #[error("output dimension {dim} must be in 1..={max}")]
    InvalidDim { dim: usize, max: usize },

    #[error("{0} is not fitted")]
    NotFitted(String),

    #[error("unknown transform class {0:?}")]
    UnknownClass(String),

    #[error("invalid input: {0}")]
    Invalid(String),
}
