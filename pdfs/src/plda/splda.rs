use std::collections::HashMap;
use std::collections::hash_map::Entry;

use hyperion_io::ModelStore;
use hyperion_math::LOG_2PI;
use hyperion_math::linalg::{
    chol_lower, floor_eigenvalues, invert_pdmat, logdet_pdmat, symmetrize, top_k_factor,
};
use nalgebra::{DMatrix, DVector};

use super::{
    PldaConfig, PldaModel, PldaType, SCATTER_FLOOR, TrainData, blend_vector, check_avg_compatible,
    check_latent_dim,
};
use crate::PdfError;

/// Parameters of a simplified PLDA: `x = mu + V y + ε`, `y ~ N(0, I)`,
/// `ε ~ N(0, W⁻¹)`.
#[derive(Debug, Clone, PartialEq)]
pub struct SPldaParams {
    pub mu: DVector<f64>,
    /// Speaker loadings, `x_dim × y_dim`.
    pub v: DMatrix<f64>,
    /// Within-class precision.
    pub w: DMatrix<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SPlda {
    config: PldaConfig,
    params: Option<SPldaParams>,
}

/// Posterior moments of the speaker factors.
#[derive(Debug, Clone)]
pub struct SPldaStats {
    /// `Σ_i E[y_i]`
    y_sum: DVector<f64>,
    /// `Σ_i E[y_i y_iᵀ]`
    py: DMatrix<f64>,
    /// `Σ_i n_i E[y_i y_iᵀ]`
    ry: DMatrix<f64>,
    /// `Σ_i n_i E[y_i]`
    ry1: DVector<f64>,
    /// `Σ_i F_i E[y_i]ᵀ`
    cy: DMatrix<f64>,
    /// `Σ_i KL(q(y_i) ‖ p(y_i))`
    kl: f64,
}

impl SPlda {
    pub fn new(y_dim: usize, name: impl Into<String>) -> Self {
        Self {
            config: PldaConfig::new(name, y_dim, 0),
            params: None,
        }
    }

    pub fn from_params(params: SPldaParams, name: impl Into<String>) -> Result<Self, PdfError> {
        let mut config = PldaConfig::new(name, params.v.ncols(), 0);
        config.x_dim = params.mu.len();
        let model = Self {
            config,
            params: Some(params),
        };
        model.validate()?;
        Ok(model)
    }

    pub fn params(&self) -> Result<&SPldaParams, PdfError> {
        self.params.as_ref().ok_or(PdfError::NotInitialized)
    }

    fn validate(&self) -> Result<(), PdfError> {
        let p = self.params()?;
        let d = self.config.x_dim;
        for (expected, got) in [
            (d, p.mu.len()),
            (d, p.v.nrows()),
            (self.config.y_dim, p.v.ncols()),
            (d, p.w.nrows()),
            (d, p.w.ncols()),
        ] {
            if expected != got {
                return Err(PdfError::DimensionMismatch { expected, got });
            }
        }
        check_latent_dim("y", self.config.y_dim, d)
    }
}

impl PldaModel for SPlda {
    type Stats = SPldaStats;

    const TYPE: PldaType = PldaType::SPlda;

    fn config(&self) -> &PldaConfig {
        &self.config
    }

    fn config_mut(&mut self) -> &mut PldaConfig {
        &mut self.config
    }

    fn is_init(&self) -> bool {
        self.params.is_some()
    }

    fn mu(&self) -> Result<&DVector<f64>, PdfError> {
        Ok(&self.params()?.mu)
    }

    fn initialize(&mut self, data: &TrainData) -> Result<(), PdfError> {
        let x_dim = data.x_dim();
        check_latent_dim("y", self.config.y_dim, x_dim)?;
        let (mu, sb, sw) = data.scatter();
        let v = top_k_factor(&sb, self.config.y_dim)?;
        let (w, _) = invert_pdmat(&floor_eigenvalues(&sw, SCATTER_FLOOR)?)?;
        self.config.x_dim = x_dim;
        self.params = Some(SPldaParams { mu, v, w });
        Ok(())
    }

    fn estep(&self, data: &TrainData) -> Result<SPldaStats, PdfError> {
        let p = self.params()?;
        let y_dim = self.config.y_dim;
        let vtw = p.v.transpose() * &p.w;
        let vtwv = &vtw * &p.v;

        let mut stats = SPldaStats {
            y_sum: DVector::zeros(y_dim),
            py: DMatrix::zeros(y_dim, y_dim),
            ry: DMatrix::zeros(y_dim, y_dim),
            ry1: DVector::zeros(y_dim),
            cy: DMatrix::zeros(data.x_dim(), y_dim),
            kl: 0.0,
        };
        // posterior covariance depends on the class size only
        let mut by_count: HashMap<usize, (DMatrix<f64>, f64)> = HashMap::new();
        for c in 0..data.num_classes() {
            let n = data.counts()[c];
            let (l_inv, logdet_l) = match by_count.entry(n as usize) {
                Entry::Occupied(e) => e.into_mut(),
                Entry::Vacant(e) => e.insert(invert_pdmat(&(DMatrix::identity(y_dim, y_dim) + &vtwv * n))?),
            };
            let l_inv = &*l_inv;
            let fc = data.class_sum(c);
            let y = l_inv * (&vtw * (&fc - &p.mu * n));
            let eyy = l_inv + &y * y.transpose();

            stats.y_sum += &y;
            stats.py += &eyy;
            stats.ry += &eyy * n;
            stats.ry1 += &y * n;
            stats.cy += &fc * y.transpose();
            stats.kl += 0.5 * (l_inv.trace() + y.dot(&y) - y_dim as f64 + *logdet_l);
        }
        symmetrize(&mut stats.py);
        symmetrize(&mut stats.ry);
        Ok(stats)
    }

    fn elbo(&self, data: &TrainData, stats: &SPldaStats) -> Result<f64, PdfError> {
        let p = self.params()?;
        let n = data.num_samples() as f64;
        let d = data.x_dim() as f64;
        let logdet_w = logdet_pdmat(&p.w)?;

        let s_c = data.centered_s(&p.mu);
        let c_c = &stats.cy - &p.mu * stats.ry1.transpose();
        let vcc = &p.v * c_c.transpose();
        let q = s_c - &vcc - vcc.transpose() + &p.v * &stats.ry * p.v.transpose();
        let tr_wq = p.w.component_mul(&q).sum();

        let llk = 0.5 * n * logdet_w - 0.5 * n * d * LOG_2PI - 0.5 * tr_wq;
        Ok(llk - stats.kl)
    }

    fn mstep_ml(&mut self, data: &TrainData, stats: &SPldaStats) -> Result<(), PdfError> {
        let y_dim = self.config.y_dim;
        let x_dim = data.x_dim();
        let n = data.num_samples() as f64;

        // joint update of [V mu] with augmented factors [y; 1]
        let mut ra = DMatrix::zeros(y_dim + 1, y_dim + 1);
        ra.view_mut((0, 0), (y_dim, y_dim)).copy_from(&stats.ry);
        ra.view_mut((0, y_dim), (y_dim, 1)).copy_from(&stats.ry1);
        ra.view_mut((y_dim, 0), (1, y_dim)).copy_from(&stats.ry1.transpose());
        ra[(y_dim, y_dim)] = n;
        let mut ca = DMatrix::zeros(x_dim, y_dim + 1);
        ca.view_mut((0, 0), (x_dim, y_dim)).copy_from(&stats.cy);
        ca.set_column(y_dim, data.f_tot());

        let (ra_inv, _) = invert_pdmat(&ra)?;
        let theta = &ca * ra_inv;
        let mut sw = (data.s() - &theta * ca.transpose()) / n;
        symmetrize(&mut sw);
        let (w, _) = invert_pdmat(&sw)?;

        let p = self.params.as_mut().ok_or(PdfError::NotInitialized)?;
        p.v = theta.columns(0, y_dim).into_owned();
        p.mu = theta.column(y_dim).into_owned();
        p.w = w;
        Ok(())
    }

    fn mstep_md(&mut self, data: &TrainData, stats: &SPldaStats) -> Result<(), PdfError> {
        let m = data.num_classes() as f64;
        let mu_y = &stats.y_sum / m;
        let mut cov = &stats.py / m - &mu_y * mu_y.transpose();
        symmetrize(&mut cov);
        let chol = chol_lower(&cov)?;

        let p = self.params.as_mut().ok_or(PdfError::NotInitialized)?;
        p.mu += &p.v * mu_y;
        p.v = &p.v * chol;
        Ok(())
    }

    fn between_within(&self) -> Result<(DMatrix<f64>, DMatrix<f64>), PdfError> {
        let p = self.params()?;
        let mut sb = &p.v * p.v.transpose();
        symmetrize(&mut sb);
        let (sw, _) = invert_pdmat(&p.w)?;
        Ok((sb, sw))
    }

    fn weighted_avg_model(&self, other: &Self, w_mu: f64, w_b: f64, w_w: f64) -> Result<Self, PdfError> {
        check_avg_compatible(&self.config, &other.config, [w_mu, w_b, w_w])?;
        let a = self.params()?;
        let b = other.params()?;

        let mu = blend_vector(&a.mu, &b.mu, w_mu);
        let v = if w_b == 1.0 {
            a.v.clone()
        } else if w_b == 0.0 {
            b.v.clone()
        } else {
            let sb = &a.v * a.v.transpose() * w_b + &b.v * b.v.transpose() * (1.0 - w_b);
            top_k_factor(&sb, self.config.y_dim)?
        };
        let w = if w_w == 1.0 {
            a.w.clone()
        } else if w_w == 0.0 {
            b.w.clone()
        } else {
            let (sw_a, _) = invert_pdmat(&a.w)?;
            let (sw_b, _) = invert_pdmat(&b.w)?;
            invert_pdmat(&(sw_a * w_w + sw_b * (1.0 - w_w)))?.0
        };

        Ok(Self {
            config: self.config.clone(),
            params: Some(SPldaParams { mu, v, w }),
        })
    }

    fn save_params(&self, store: &mut ModelStore) -> Result<(), PdfError> {
        let p = self.params()?;
        let name = &self.config.name;
        store.put_vector(ModelStore::key(name, "mu"), &p.mu)?;
        store.put_matrix(ModelStore::key(name, "V"), &p.v)?;
        store.put_matrix(ModelStore::key(name, "W"), &p.w)?;
        Ok(())
    }

    fn load_params(store: &ModelStore, config: PldaConfig) -> Result<Self, PdfError> {
        let name = &config.name;
        let params = SPldaParams {
            mu: store.get_vector(&ModelStore::key(name, "mu"))?,
            v: store.get_matrix(&ModelStore::key(name, "V"))?,
            w: store.get_matrix(&ModelStore::key(name, "W"))?,
        };
        let model = Self {
            config,
            params: Some(params),
        };
        model.validate()?;
        Ok(model)
    }
}
