use hyperion_io::IoError;
use hyperion_math::MathError;
use thiserror::Error;

/// Errors returned by density and PLDA operations.
#[derive(Debug, Error)]
pub enum PdfError {
    #[error(transparent)]
    Math(#[from] MathError),

    #[error(transparent)]
    Io(#[from] IoError),

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("{what} dimension {dim} exceeds feature dimension {x_dim}")]
    LatentDimTooLarge {
        what: &'static str,
        dim: usize,
        x_dim: usize,
    },

    #[error("{labels} class ids for {samples} samples")]
    LabelCountMismatch { labels: usize, samples: usize },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("model is not initialized")]
    NotInitialized,

    #[error("cannot combine a {left} model with a {right} model")]
    VariantMismatch { left: String, right: String },

    #[error("no {0} model found in container")]
    ModelNotFound(String),

    #[error("unknown model class {0:?}")]
    UnknownClass(String),
}
