//! Exponential-family densities.
//!
//! A density in the family is written `p(x) = h(x) exp(ηᵀu(x) − A(η))`, where
//! `η` are the natural parameters, `u(x)` the sufficient statistics and `A`
//! the log-partition. Implementors hold either the natural or the standard
//! parameterization and convert on [`ExpFamily::initialize`].

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::PdfError;

/// Common interface of exponential-family models.
///
/// Full-batch maximum-likelihood fitting, log-likelihood and ELBO evaluation
/// are provided on top of the model-specific parameter transforms.
pub trait ExpFamily {
    /// Standard (moment) parameters, e.g. mean and precision.
    type Std: Clone;

    fn x_dim(&self) -> usize;

    /// True once both parameterizations are available.
    fn is_init(&self) -> bool;

    /// Validates the parameters that are present and computes the missing
    /// parameterization. Fails if neither is set.
    fn initialize(&mut self) -> Result<(), PdfError>;

    /// Checks dimensions and positivity of the present parameters.
    fn validate(&self) -> Result<(), PdfError>;

    /// Natural parameters of an initialized model.
    fn eta(&self) -> Result<&DVector<f64>, PdfError>;

    /// Log-partition `A(η)` of an initialized model.
    fn log_partition(&self) -> Result<f64, PdfError>;

    fn compute_eta(std: &Self::Std) -> DVector<f64>;

    fn compute_std(eta: &DVector<f64>) -> Result<Self::Std, PdfError>;

    /// `A` as a function of the natural parameters.
    fn compute_a_nat(eta: &DVector<f64>) -> f64;

    /// `A` as a function of the standard parameters. Agrees with
    /// [`ExpFamily::compute_a_nat`] on the same model.
    fn compute_a_std(std: &Self::Std) -> f64;

    /// Per-sample sufficient statistics `u(x)`, one row per sample.
    fn compute_suff_stats(x: &DMatrix<f64>) -> DMatrix<f64>;

    /// Concatenates first and second order statistics.
    fn stack_suff_stats(f: &DVector<f64>, s: &DVector<f64>) -> DVector<f64> {
        let mut out = DVector::zeros(f.len() + s.len());
        out.rows_mut(0, f.len()).copy_from(f);
        out.rows_mut(f.len(), s.len()).copy_from(s);
        out
    }

    /// Splits stacked statistics back into first and second order parts.
    fn unstack_suff_stats(
        &self,
        u_x: &DVector<f64>,
    ) -> Result<(DVector<f64>, DVector<f64>), PdfError>;

    /// Maximum-likelihood update from accumulated statistics.
    fn mstep(&mut self, n: f64, u_x: &DVector<f64>) -> Result<(), PdfError>;

    /// Log base measure `ln h(x)`.
    fn log_h(&self, x: &DMatrix<f64>) -> DVector<f64> {
        DVector::zeros(x.nrows())
    }

    fn check_x_dim(&self, x: &DMatrix<f64>) -> Result<(), PdfError> {
        if x.ncols() != self.x_dim() {
            return Err(PdfError::DimensionMismatch {
                expected: self.x_dim(),
                got: x.ncols(),
            });
        }
        Ok(())
    }

    /// Returns `(N, Σ w_i u(x_i))`, with unit weights when `sample_weight`
    /// is `None`.
    fn accum_suff_stats(
        &self,
        x: &DMatrix<f64>,
        sample_weight: Option<&DVector<f64>>,
    ) -> Result<(f64, DVector<f64>), PdfError> {
        self.check_x_dim(x)?;
        let u = Self::compute_suff_stats(x);
        match sample_weight {
            None => Ok((x.nrows() as f64, u.row_sum().transpose())),
            Some(w) => {
                if w.len() != x.nrows() {
                    return Err(PdfError::DimensionMismatch {
                        expected: x.nrows(),
                        got: w.len(),
                    });
                }
                Ok((w.sum(), u.transpose() * w))
            }
        }
    }

    /// Log-density through the natural parameters.
    fn log_prob_nat(&self, x: &DMatrix<f64>) -> Result<DVector<f64>, PdfError> {
        self.check_x_dim(x)?;
        let eta = self.eta()?;
        let a = self.log_partition()?;
        let mut out = Self::compute_suff_stats(x) * eta;
        out.add_scalar_mut(-a);
        out += self.log_h(x);
        Ok(out)
    }

    /// Log-density of each row. Densities with a cheaper closed form in
    /// the standard parameters override this.
    fn log_prob(&self, x: &DMatrix<f64>) -> Result<DVector<f64>, PdfError> {
        self.log_prob_nat(x)
    }

    /// Log-likelihood of each row.
    fn eval_llk(&self, x: &DMatrix<f64>) -> Result<DVector<f64>, PdfError> {
        self.log_prob(x)
    }

    /// Total ELBO (the exact log-likelihood for fully observed data) given
    /// accumulated statistics.
    fn elbo_from_stats(&self, x: &DMatrix<f64>, n: f64, u_x: &DVector<f64>) -> Result<f64, PdfError> {
        let eta = self.eta()?;
        let a = self.log_partition()?;
        Ok(self.log_h(x).sum() + u_x.dot(eta) - n * a)
    }

    fn elbo(&self, x: &DMatrix<f64>, sample_weight: Option<&DVector<f64>>) -> Result<f64, PdfError> {
        let (n, u_x) = self.accum_suff_stats(x, sample_weight)?;
        self.elbo_from_stats(x, n, &u_x)
    }

    /// One full-batch M-step. Returns the ELBO per sample after the update.
    fn fit(&mut self, x: &DMatrix<f64>, sample_weight: Option<&DVector<f64>>) -> Result<f64, PdfError> {
        let (n, u_x) = self.accum_suff_stats(x, sample_weight)?;
        self.mstep(n, &u_x)?;
        let elbo = self.elbo_from_stats(x, n, &u_x)?;
        debug!(n, elbo, elbo_norm = elbo / n, "exp-family fit");
        Ok(elbo / n)
    }
}
