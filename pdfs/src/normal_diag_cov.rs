//! Gaussian with diagonal covariance.

use std::cell::OnceCell;
use std::path::Path;

use hyperion_io::ModelStore;
use hyperion_math::LOG_2PI;
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::exp_family::ExpFamily;
use crate::store::{config_key, find_model};
use crate::PdfError;

pub const NORMAL_DIAG_COV_CLASS: &str = "NormalDiagCov";

/// Mean and per-dimension precision.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagGaussParams {
    pub mu: DVector<f64>,
    pub lambda: DVector<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalDiagCovConfig {
    pub name: String,
    pub x_dim: usize,
    /// Lower bound applied to every variance estimated by the M-step.
    pub var_floor: f64,
    pub update_mu: bool,
    pub update_lambda: bool,
}

impl Default for NormalDiagCovConfig {
    fn default() -> Self {
        Self {
            name: "normal_diag_cov".to_string(),
            x_dim: 1,
            var_floor: 1e-5,
            update_mu: true,
            update_lambda: true,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct StoredConfig {
    class_name: String,
    #[serde(flatten)]
    config: NormalDiagCovConfig,
}

#[derive(Debug, Clone)]
enum Params {
    Empty,
    Standard(DiagGaussParams),
    Natural(DVector<f64>),
    Both {
        std: DiagGaussParams,
        eta: DVector<f64>,
        a: f64,
    },
}

/// Quantities derived from the precision; cleared whenever parameters change.
#[derive(Debug, Clone, Default)]
struct Derived {
    log_lambda: OnceCell<f64>,
    chol_lambda: OnceCell<DVector<f64>>,
    sigma: OnceCell<DVector<f64>>,
}

/// Diagonal-covariance Gaussian in the exponential family.
///
/// Sufficient statistics are `u(x) = [x, x²]`; natural parameters are
/// `η = [Λμ, −Λ/2]`.
#[derive(Debug, Clone)]
pub struct NormalDiagCov {
    config: NormalDiagCovConfig,
    params: Params,
    derived: Derived,
}

impl NormalDiagCov {
    /// Empty model; parameters come from [`ExpFamily::fit`] or
    /// [`ExpFamily::mstep`].
    pub fn new(x_dim: usize) -> Self {
        Self::with_config(NormalDiagCovConfig {
            x_dim,
            ..Default::default()
        })
    }

    pub fn with_config(config: NormalDiagCovConfig) -> Self {
        Self {
            config,
            params: Params::Empty,
            derived: Derived::default(),
        }
    }

    /// Initialized model from mean and precision.
    pub fn from_std(mu: DVector<f64>, lambda: DVector<f64>) -> Result<Self, PdfError> {
        let mut model = Self::new(mu.len());
        model.params = Params::Standard(DiagGaussParams { mu, lambda });
        model.initialize()?;
        Ok(model)
    }

    /// Initialized model from natural parameters.
    pub fn from_eta(eta: DVector<f64>) -> Result<Self, PdfError> {
        let mut model = Self::new(eta.len() / 2);
        model.params = Params::Natural(eta);
        model.initialize()?;
        Ok(model)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn with_var_floor(mut self, var_floor: f64) -> Self {
        self.config.var_floor = var_floor;
        self
    }

    pub fn with_updates(mut self, update_mu: bool, update_lambda: bool) -> Self {
        self.config.update_mu = update_mu;
        self.config.update_lambda = update_lambda;
        self
    }

    pub fn config(&self) -> &NormalDiagCovConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Makes the standard parameters available, converting from the
    /// natural ones if needed.
    pub fn ensure_standard(&mut self) -> Result<&DiagGaussParams, PdfError> {
        if let Params::Natural(eta) = &self.params {
            let eta = eta.clone();
            let std = Self::compute_std(&eta)?;
            let a = Self::compute_a_nat(&eta);
            self.params = Params::Both { std, eta, a };
        }
        match &self.params {
            Params::Standard(std) | Params::Both { std, .. } => Ok(std),
            _ => Err(PdfError::NotInitialized),
        }
    }

    /// Makes the natural parameters available, converting from the
    /// standard ones if needed.
    pub fn ensure_natural(&mut self) -> Result<&DVector<f64>, PdfError> {
        if let Params::Standard(std) = &self.params {
            let std = std.clone();
            let eta = Self::compute_eta(&std);
            let a = Self::compute_a_std(&std);
            self.params = Params::Both { std, eta, a };
        }
        match &self.params {
            Params::Natural(eta) | Params::Both { eta, .. } => Ok(eta),
            _ => Err(PdfError::NotInitialized),
        }
    }

    fn set_std(&mut self, std: DiagGaussParams) {
        let eta = Self::compute_eta(&std);
        let a = Self::compute_a_std(&std);
        self.params = Params::Both { std, eta, a };
        self.derived = Derived::default();
    }

    /// Standard parameters of an initialized model.
    pub fn params(&self) -> Result<&DiagGaussParams, PdfError> {
        match &self.params {
            Params::Both { std, .. } => Ok(std),
            _ => Err(PdfError::NotInitialized),
        }
    }

    pub fn mu(&self) -> Result<&DVector<f64>, PdfError> {
        Ok(&self.params()?.mu)
    }

    pub fn lambda(&self) -> Result<&DVector<f64>, PdfError> {
        Ok(&self.params()?.lambda)
    }

    /// `Σ ln Λ_d`.
    pub fn log_lambda(&self) -> Result<f64, PdfError> {
        let p = self.params()?;
        Ok(*self
            .derived
            .log_lambda
            .get_or_init(|| p.lambda.iter().map(|v| v.ln()).sum()))
    }

    /// `sqrt(Λ)`, the diagonal Cholesky factor of the precision.
    pub fn chol_lambda(&self) -> Result<&DVector<f64>, PdfError> {
        let p = self.params()?;
        Ok(self.derived.chol_lambda.get_or_init(|| p.lambda.map(f64::sqrt)))
    }

    /// Per-dimension variance `1/Λ`.
    pub fn sigma(&self) -> Result<&DVector<f64>, PdfError> {
        let p = self.params()?;
        Ok(self.derived.sigma.get_or_init(|| p.lambda.map(|v| 1.0 / v)))
    }

    /// Log-density through mean and precision.
    pub fn log_prob_std(&self, x: &DMatrix<f64>) -> Result<DVector<f64>, PdfError> {
        self.check_x_dim(x)?;
        let p = self.params()?;
        let chol = self.chol_lambda()?;
        let c = 0.5 * self.log_lambda()? - 0.5 * self.config.x_dim as f64 * LOG_2PI;
        Ok(DVector::from_iterator(
            x.nrows(),
            x.row_iter().map(|row| {
                let mah: f64 = row
                    .iter()
                    .zip(p.mu.iter().zip(chol.iter()))
                    .map(|(xv, (m, l))| ((xv - m) * l).powi(2))
                    .sum();
                c - 0.5 * mah
            }),
        ))
    }

    /// Sum over dimensions of the log marginal CDF.
    pub fn log_cdf(&self, x: &DMatrix<f64>) -> Result<DVector<f64>, PdfError> {
        self.check_x_dim(x)?;
        let p = self.params()?;
        let chol = self.chol_lambda()?;
        Ok(DVector::from_iterator(
            x.nrows(),
            x.row_iter().map(|row| {
                row.iter()
                    .zip(p.mu.iter().zip(chol.iter()))
                    .map(|(xv, (m, l))| {
                        let delta = (xv - m) * l;
                        let lk = 0.5 * (1.0 + libm::erf(delta / std::f64::consts::SQRT_2));
                        (lk + 1e-10).ln()
                    })
                    .sum::<f64>()
            }),
        ))
    }

    /// Draws `num_samples` rows from a generator seeded with `seed`.
    pub fn sample(&self, num_samples: usize, seed: u64) -> Result<DMatrix<f64>, PdfError> {
        let mut rng = StdRng::seed_from_u64(seed);
        self.sample_with_rng(num_samples, &mut rng)
    }

    pub fn sample_with_rng<R: Rng>(
        &self,
        num_samples: usize,
        rng: &mut R,
    ) -> Result<DMatrix<f64>, PdfError> {
        let p = self.params()?;
        let chol = self.chol_lambda()?;
        let d = self.config.x_dim;
        let mut x = DMatrix::zeros(num_samples, d);
        for i in 0..num_samples {
            for j in 0..d {
                let z: f64 = rng.sample(StandardNormal);
                x[(i, j)] = p.mu[j] + z / chol[j];
            }
        }
        Ok(x)
    }

    /// Centers and whitens accumulated statistics with the current model.
    ///
    /// Returns `sqrt(Λ)(F − Nμ)`, stacked with `Λ(S − 2μF + Nμ²)` when
    /// `return_order2` is set.
    pub fn norm_suff_stats(
        &self,
        n: f64,
        u_x: &DVector<f64>,
        return_order2: bool,
    ) -> Result<DVector<f64>, PdfError> {
        let p = self.params()?;
        let chol = self.chol_lambda()?;
        let (f, s) = self.unstack_suff_stats(u_x)?;
        let f_norm = (&f - &p.mu * n).component_mul(chol);
        if !return_order2 {
            return Ok(f_norm);
        }
        let mu2 = p.mu.component_mul(&p.mu);
        let s_norm = (s - p.mu.component_mul(&f) * 2.0 + mu2 * n).component_mul(&p.lambda);
        Ok(Self::stack_suff_stats(&f_norm, &s_norm))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), PdfError> {
        let mut store = ModelStore::new();
        self.save_to(&mut store)?;
        store.save(path)?;
        Ok(())
    }

    /// Writes config and parameters under this model's name.
    pub fn save_to(&self, store: &mut ModelStore) -> Result<(), PdfError> {
        let p = self.params()?;
        let name = &self.config.name;
        store.put_config(
            config_key(name),
            &StoredConfig {
                class_name: NORMAL_DIAG_COV_CLASS.to_string(),
                config: self.config.clone(),
            },
        )?;
        store.put_vector(ModelStore::key(name, "mu"), &p.mu)?;
        store.put_vector(ModelStore::key(name, "Lambda"), &p.lambda)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, PdfError> {
        let store = ModelStore::open(path)?;
        let (name, _) = find_model(&store, &[NORMAL_DIAG_COV_CLASS])?;
        Self::load_from(&store, &name)
    }

    pub fn load_from(store: &ModelStore, name: &str) -> Result<Self, PdfError> {
        let stored: StoredConfig = store.get_config(&config_key(name))?;
        if stored.class_name != NORMAL_DIAG_COV_CLASS {
            return Err(PdfError::UnknownClass(stored.class_name));
        }
        let mu = store.get_vector(&ModelStore::key(name, "mu"))?;
        let lambda = store.get_vector(&ModelStore::key(name, "Lambda"))?;
        let mut model = Self::with_config(stored.config);
        model.params = Params::Standard(DiagGaussParams { mu, lambda });
        model.initialize()?;
        Ok(model)
    }

    fn check_len(&self, v: &DVector<f64>, expected: usize) -> Result<(), PdfError> {
        if v.len() != expected {
            return Err(PdfError::DimensionMismatch {
                expected,
                got: v.len(),
            });
        }
        Ok(())
    }
}

impl ExpFamily for NormalDiagCov {
    type Std = DiagGaussParams;

    fn x_dim(&self) -> usize {
        self.config.x_dim
    }

    fn is_init(&self) -> bool {
        matches!(self.params, Params::Both { .. })
    }

    fn initialize(&mut self) -> Result<(), PdfError> {
        if matches!(self.params, Params::Empty) {
            return Err(PdfError::Validation(
                "neither natural nor standard parameters are set".to_string(),
            ));
        }
        self.validate()?;
        self.ensure_standard()?;
        self.ensure_natural()?;
        self.validate()?;
        self.derived = Derived::default();
        Ok(())
    }

    fn validate(&self) -> Result<(), PdfError> {
        let d = self.config.x_dim;
        match &self.params {
            Params::Empty => Ok(()),
            Params::Natural(eta) => {
                self.check_len(eta, 2 * d)?;
                if eta.rows(d, d).iter().any(|v| v.is_nan() || *v >= 0.0) {
                    return Err(PdfError::Validation(
                        "second natural parameter must be negative".to_string(),
                    ));
                }
                Ok(())
            }
            Params::Standard(std) | Params::Both { std, .. } => {
                self.check_len(&std.mu, d)?;
                self.check_len(&std.lambda, d)?;
                if std.lambda.iter().any(|v| !v.is_finite() || *v <= 0.0) {
                    return Err(PdfError::Validation(
                        "precision must be strictly positive".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }

    fn eta(&self) -> Result<&DVector<f64>, PdfError> {
        match &self.params {
            Params::Both { eta, .. } => Ok(eta),
            _ => Err(PdfError::NotInitialized),
        }
    }

    fn log_partition(&self) -> Result<f64, PdfError> {
        match &self.params {
            Params::Both { a, .. } => Ok(*a),
            _ => Err(PdfError::NotInitialized),
        }
    }

    fn log_prob(&self, x: &DMatrix<f64>) -> Result<DVector<f64>, PdfError> {
        self.log_prob_std(x)
    }

    fn compute_eta(std: &DiagGaussParams) -> DVector<f64> {
        let eta1 = std.lambda.component_mul(&std.mu);
        let eta2 = &std.lambda * -0.5;
        Self::stack_suff_stats(&eta1, &eta2)
    }

    fn compute_std(eta: &DVector<f64>) -> Result<DiagGaussParams, PdfError> {
        if eta.len() % 2 != 0 {
            return Err(PdfError::Validation(format!(
                "natural parameter length {} is odd",
                eta.len()
            )));
        }
        let d = eta.len() / 2;
        let eta1 = eta.rows(0, d);
        let eta2 = eta.rows(d, d);
        if eta2.iter().any(|v| v.is_nan() || *v >= 0.0) {
            return Err(PdfError::Validation(
                "second natural parameter must be negative".to_string(),
            ));
        }
        let mu = DVector::from_iterator(d, eta1.iter().zip(eta2.iter()).map(|(a, b)| -0.5 * a / b));
        let lambda = DVector::from_iterator(d, eta2.iter().map(|b| -2.0 * b));
        Ok(DiagGaussParams { mu, lambda })
    }

    fn compute_a_nat(eta: &DVector<f64>) -> f64 {
        let d = eta.len() / 2;
        let eta1 = eta.rows(0, d);
        let eta2 = eta.rows(d, d);
        let r1 = 0.5 * d as f64 * LOG_2PI;
        let r2: f64 = -0.25 * eta1.iter().zip(eta2.iter()).map(|(a, b)| a * a / b).sum::<f64>();
        let r3: f64 = -0.5 * eta2.iter().map(|b| (-2.0 * b).ln()).sum::<f64>();
        r1 + r2 + r3
    }

    fn compute_a_std(std: &DiagGaussParams) -> f64 {
        let d = std.mu.len();
        let r1 = 0.5 * d as f64 * LOG_2PI;
        let r2 = -0.5 * std.lambda.iter().map(|v| v.ln()).sum::<f64>();
        let r3 = 0.5
            * std
                .mu
                .iter()
                .zip(std.lambda.iter())
                .map(|(m, l)| m * m * l)
                .sum::<f64>();
        r1 + r2 + r3
    }

    fn compute_suff_stats(x: &DMatrix<f64>) -> DMatrix<f64> {
        let d = x.ncols();
        let mut u = DMatrix::zeros(x.nrows(), 2 * d);
        u.columns_mut(0, d).copy_from(x);
        u.columns_mut(d, d).copy_from(&x.component_mul(x));
        u
    }

    fn unstack_suff_stats(
        &self,
        u_x: &DVector<f64>,
    ) -> Result<(DVector<f64>, DVector<f64>), PdfError> {
        let d = self.config.x_dim;
        self.check_len(u_x, 2 * d)?;
        Ok((u_x.rows(0, d).into_owned(), u_x.rows(d, d).into_owned()))
    }

    fn mstep(&mut self, n: f64, u_x: &DVector<f64>) -> Result<(), PdfError> {
        if n.is_nan() || n <= 0.0 {
            return Err(PdfError::Validation(format!(
                "M-step needs a positive sample count, got {n}"
            )));
        }
        let (f, s) = self.unstack_suff_stats(u_x)?;
        let current = if matches!(self.params, Params::Empty) {
            None
        } else {
            Some(self.ensure_standard()?.clone())
        };

        let mu = match (&current, self.config.update_mu) {
            (_, true) => &f / n,
            (Some(p), false) => p.mu.clone(),
            (None, false) => return Err(PdfError::NotInitialized),
        };

        let floor = self.config.var_floor;
        let (lambda, var) = match (&current, self.config.update_lambda) {
            (_, true) => {
                let var = (&s / n - mu.component_mul(&mu)).map(|v| v.max(floor));
                (var.map(|v| 1.0 / v), Some(var))
            }
            (Some(p), false) => (p.lambda.clone(), None),
            (None, false) => return Err(PdfError::NotInitialized),
        };

        self.set_std(DiagGaussParams { mu, lambda });
        if let Some(var) = var {
            let _ = self.derived.sigma.set(var);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy() -> NormalDiagCov {
        NormalDiagCov::from_std(
            DVector::from_vec(vec![0.5, -1.0, 2.0]),
            DVector::from_vec(vec![1.0, 4.0, 0.25]),
        )
        .unwrap()
    }

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol * (1.0 + a.abs().max(b.abs()))
    }

    #[test]
    fn natural_standard_round_trip() {
        let std = DiagGaussParams {
            mu: DVector::from_vec(vec![0.3, -2.0, 7.5, 0.0]),
            lambda: DVector::from_vec(vec![0.1, 2.0, 30.0, 1.0]),
        };
        let eta = NormalDiagCov::compute_eta(&std);
        let back = NormalDiagCov::compute_std(&eta).unwrap();
        for i in 0..4 {
            assert!(close(back.mu[i], std.mu[i], 1e-12), "mu[{i}] = {}", back.mu[i]);
            assert!(close(back.lambda[i], std.lambda[i], 1e-12));
        }
        let a_nat = NormalDiagCov::compute_a_nat(&eta);
        let a_std = NormalDiagCov::compute_a_std(&std);
        assert!(close(a_nat, a_std, 1e-12), "A_nat={a_nat} A_std={a_std}");
    }

    #[test]
    fn from_eta_matches_from_std() {
        let a = toy();
        let b = NormalDiagCov::from_eta(a.eta().unwrap().clone()).unwrap();
        let x = DMatrix::from_row_slice(2, 3, &[0.0, 0.0, 0.0, 1.0, -1.5, 3.0]);
        let la = a.log_prob_std(&x).unwrap();
        let lb = b.log_prob_std(&x).unwrap();
        for i in 0..2 {
            assert!(close(la[i], lb[i], 1e-12));
        }
    }

    #[test]
    fn log_prob_nat_matches_std() {
        let m = toy();
        let x = DMatrix::from_row_slice(3, 3, &[0.5, -1.0, 2.0, 1.0, 0.0, -1.0, -3.0, 2.5, 8.0]);
        let nat = m.log_prob_nat(&x).unwrap();
        let std = m.log_prob_std(&x).unwrap();
        assert_eq!(m.log_prob(&x).unwrap(), std);
        for i in 0..3 {
            assert!(close(nat[i], std[i], 1e-10), "row {i}: {} vs {}", nat[i], std[i]);
        }
    }

    #[test]
    fn variance_floor_on_constant_dimension() {
        let n = 50;
        let x = DMatrix::from_fn(n, 2, |i, j| if j == 0 { i as f64 * 0.1 } else { 3.0 });
        let mut m = NormalDiagCov::new(2);
        m.fit(&x, None).unwrap();
        let lambda = m.lambda().unwrap();
        assert_eq!(lambda[1], 1.0 / 1e-5);
        assert!(lambda[0] > 0.0 && lambda[0].is_finite());
        assert_eq!(m.sigma().unwrap()[1], 1e-5);
    }

    #[test]
    fn fit_returns_mean_log_likelihood() {
        let mut m = NormalDiagCov::new(3);
        let x = toy().sample(200, 3).unwrap();
        let elbo = m.fit(&x, None).unwrap();
        let llk = m.log_prob_std(&x).unwrap();
        assert!(close(elbo, llk.mean(), 1e-9), "elbo={elbo} mean llk={}", llk.mean());
    }

    #[test]
    fn weighted_fit_ignores_zero_weight_rows() {
        let x = DMatrix::from_row_slice(4, 1, &[1.0, 3.0, 100.0, -50.0]);
        let w = DVector::from_vec(vec![1.0, 1.0, 0.0, 0.0]);
        let mut m = NormalDiagCov::new(1);
        m.fit(&x, Some(&w)).unwrap();
        assert!(close(m.mu().unwrap()[0], 2.0, 1e-12));
        assert!(close(m.lambda().unwrap()[0], 1.0, 1e-12));
    }

    #[test]
    fn update_flags_freeze_parameters() {
        let mut m = toy().with_updates(false, true);
        let x = DMatrix::from_row_slice(2, 3, &[1.0, 1.0, 1.0, 3.0, 3.0, 3.0]);
        m.fit(&x, None).unwrap();
        assert_eq!(m.mu().unwrap(), &DVector::from_vec(vec![0.5, -1.0, 2.0]));

        let mut empty = NormalDiagCov::new(3).with_updates(false, true);
        assert!(matches!(empty.fit(&x, None), Err(PdfError::NotInitialized)));
    }

    #[test]
    fn mstep_rejects_empty_stats() {
        let mut m = NormalDiagCov::new(2);
        let err = m.mstep(0.0, &DVector::zeros(4)).unwrap_err();
        assert!(matches!(err, PdfError::Validation(_)));
    }

    #[test]
    fn log_cdf_at_mean() {
        let m = toy();
        let x = DMatrix::from_row_slice(1, 3, &[0.5, -1.0, 2.0]);
        let v = m.log_cdf(&x).unwrap()[0];
        assert!(close(v, 3.0 * (0.5f64 + 1e-10).ln(), 1e-12), "log_cdf={v}");

        let far = DMatrix::from_row_slice(1, 3, &[-100.0, -100.0, -100.0]);
        let v = m.log_cdf(&far).unwrap()[0];
        assert!(v.is_finite() && v < -60.0);
    }

    #[test]
    fn sample_is_seeded_and_centered() {
        let m = toy();
        let a = m.sample(5000, 1024).unwrap();
        let b = m.sample(5000, 1024).unwrap();
        assert_eq!(a, b);
        let mean = a.row_mean();
        for j in 0..3 {
            let mu = m.mu().unwrap()[j];
            assert!((mean[j] - mu).abs() < 0.15, "dim {j}: {} vs {mu}", mean[j]);
        }
    }

    #[test]
    fn norm_suff_stats_of_training_data() {
        let mut m = NormalDiagCov::new(3);
        let x = toy().sample(500, 9).unwrap();
        m.fit(&x, None).unwrap();
        let (n, u_x) = m.accum_suff_stats(&x, None).unwrap();
        let norm = m.norm_suff_stats(n, &u_x, true).unwrap();
        for j in 0..3 {
            assert!(norm[j].abs() < 1e-8, "F_norm[{j}] = {}", norm[j]);
            assert!(close(norm[3 + j], n, 1e-8), "S_norm[{j}] = {}", norm[3 + j]);
        }
        assert_eq!(m.norm_suff_stats(n, &u_x, false).unwrap().len(), 3);
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ndc.json");
        let mut m = NormalDiagCov::new(3).with_name("ubm").with_var_floor(1e-3);
        m.fit(&toy().sample(100, 5).unwrap(), None).unwrap();
        m.save(&path).unwrap();

        let loaded = NormalDiagCov::load(&path).unwrap();
        assert_eq!(loaded.name(), "ubm");
        assert_eq!(loaded.config(), m.config());
        assert_eq!(loaded.params().unwrap(), m.params().unwrap());
        let probe = DMatrix::from_row_slice(1, 3, &[0.1, 0.2, 0.3]);
        assert_eq!(
            loaded.log_prob_std(&probe).unwrap(),
            m.log_prob_std(&probe).unwrap()
        );
    }

    #[test]
    fn uninitialized_and_invalid() {
        let mut m = NormalDiagCov::new(3);
        assert!(!m.is_init());
        assert!(matches!(m.log_prob_std(&DMatrix::zeros(1, 3)), Err(PdfError::NotInitialized)));
        assert!(matches!(m.initialize(), Err(PdfError::Validation(_))));

        let err = NormalDiagCov::from_std(
            DVector::from_vec(vec![0.0, 0.0]),
            DVector::from_vec(vec![1.0, -1.0]),
        )
        .unwrap_err();
        assert!(matches!(err, PdfError::Validation(_)));

        let err = NormalDiagCov::from_std(DVector::zeros(2), DVector::from_element(3, 1.0)).unwrap_err();
        assert!(matches!(err, PdfError::DimensionMismatch { expected: 2, got: 3 }));

        assert!(matches!(
            toy().log_prob_std(&DMatrix::zeros(1, 4)),
            Err(PdfError::DimensionMismatch { expected: 3, got: 4 })
        ));
    }
}
