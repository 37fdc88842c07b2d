//! Scatter statistics and linear feature transforms.
//!
//! - [`SbSw`] / [`NSbSw`]: between and within-class scatter, plain and
//!   nearest-neighbour.
//! - [`Lda`] / [`Nda`]: discriminant projections.
//! - [`CentWhiten`] / [`LNorm`]: whitening and length normalization.
//! - [`TransformList`]: a persisted chain of the above.

mod cent_whiten;
mod error;
mod lda;
mod sb_sw;
mod transform_list;

pub use cent_whiten::{CentWhiten, LNorm};
pub use error::TransformError;
pub use lda::{Lda, Nda};
pub use sb_sw::{NSbSw, SbSw};
pub use transform_list::{Transform, TransformList};

pub(crate) fn config_key(name: &str) -> String {
    hyperion_io::ModelStore::key(name, "config")
}

#[cfg(test)]
pub(crate) mod testdata {
    use nalgebra::DMatrix;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand_distr::{Distribution, Normal};

    /// Gaussian classes with between-class std 3 and within-class std 1.
    pub(crate) fn classes(num_classes: usize, per_class: usize, dim: usize, seed: u64) -> (DMatrix<f64>, Vec<usize>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let between = Normal::new(0.0, 3.0).unwrap();
        let within = Normal::new(0.0, 1.0).unwrap();
        let centers = DMatrix::from_fn(num_classes, dim, |_, _| between.sample(&mut rng));
        let n = num_classes * per_class;
        let ids: Vec<usize> = (0..n).map(|i| i / per_class).collect();
        let x = DMatrix::from_fn(n, dim, |i, j| centers[(ids[i], j)] + within.sample(&mut rng));
        (x, ids)
    }
}
