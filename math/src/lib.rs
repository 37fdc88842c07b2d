//! Dense linear algebra and label helpers for the hyperion back-end.
//!
//! Matrices follow the `rows = samples, columns = features` convention.
//! Everything works on `nalgebra::DMatrix<f64>` / `DVector<f64>`.

mod error;
pub mod labels;
pub mod linalg;

pub use error::MathError;
pub use labels::{densify, ClassIndex};
pub use linalg::LOG_2PI;
