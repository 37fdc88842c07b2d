use std::collections::HashMap;
use std::collections::hash_map::Entry;

use hyperion_io::ModelStore;
use hyperion_math::LOG_2PI;
use hyperion_math::linalg::{center_rows, chol_lower, invert_pdmat, sym_eig_desc, symmetrize, top_k_factor};
use nalgebra::{DMatrix, DVector};

use super::{
    PldaConfig, PldaModel, PldaType, SCATTER_FLOOR, TrainData, blend_vector, check_avg_compatible,
    check_latent_dim,
};
use crate::PdfError;

/// Mean-field sweeps over `q(y)` and `q(z)` per E-step.
const VB_ITERS: usize = 2;

/// Parameters of the y/z PLDA: `x = mu + V y + U z + ε`, with standard
/// normal `y` (per class) and `z` (per sample) and `ε ~ N(0, diag(d)⁻¹)`.
#[derive(Debug, Clone, PartialEq)]
pub struct PldaParams {
    pub mu: DVector<f64>,
    /// Speaker loadings, `x_dim × y_dim`.
    pub v: DMatrix<f64>,
    /// Channel loadings, `x_dim × z_dim`.
    pub u: DMatrix<f64>,
    /// Residual precision (diagonal).
    pub d: DVector<f64>,
}

/// PLDA with speaker and channel subspaces, trained by variational Bayes.
#[derive(Debug, Clone, PartialEq)]
pub struct Plda {
    config: PldaConfig,
    params: Option<PldaParams>,
}

#[derive(Debug, Clone)]
pub struct PldaStats {
    /// `Σ E[w wᵀ]` over samples with `w = [y; z; 1]`.
    ra: DMatrix<f64>,
    /// `Σ x E[w]ᵀ`.
    ca: DMatrix<f64>,
    /// `Σ_i E[y_i]` over classes.
    y_sum: DVector<f64>,
    /// `Σ_i E[y_i y_iᵀ]` over classes.
    py: DMatrix<f64>,
    kl: f64,
}

/// Probabilistic PCA split of a within-class covariance into `U Uᵀ` plus a
/// diagonal residual. Returns `U` and the residual precision.
fn within_factor(sw: &DMatrix<f64>, z_dim: usize) -> Result<(DMatrix<f64>, DVector<f64>), PdfError> {
    let (values, vectors) = sym_eig_desc(sw)?;
    let dim = values.len();
    let sigma2 = if z_dim < dim {
        values.rows(z_dim, dim - z_dim).mean()
    } else {
        0.1 * values.mean()
    }
    .max(SCATTER_FLOOR);
    let mut u = vectors.columns(0, z_dim).into_owned();
    for (k, mut col) in u.column_iter_mut().enumerate() {
        col *= (values[k] - sigma2).max(0.0).sqrt();
    }
    let resid = (sw - &u * u.transpose())
        .diagonal()
        .map(|v| 1.0 / v.max(SCATTER_FLOOR));
    Ok((u, resid))
}

impl Plda {
    pub fn new(y_dim: usize, z_dim: usize, name: impl Into<String>) -> Self {
        Self {
            config: PldaConfig::new(name, y_dim, z_dim),
            params: None,
        }
    }

    pub fn params(&self) -> Result<&PldaParams, PdfError> {
        self.params.as_ref().ok_or(PdfError::NotInitialized)
    }

    fn validate(&self) -> Result<(), PdfError> {
        let p = self.params()?;
        let dim = self.config.x_dim;
        for (expected, got) in [
            (dim, p.mu.len()),
            (dim, p.v.nrows()),
            (self.config.y_dim, p.v.ncols()),
            (dim, p.u.nrows()),
            (self.config.z_dim, p.u.ncols()),
            (dim, p.d.len()),
        ] {
            if expected != got {
                return Err(PdfError::DimensionMismatch { expected, got });
            }
        }
        if p.d.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return Err(PdfError::Validation("residual precision must be strictly positive".to_string()));
        }
        check_latent_dim("y", self.config.y_dim, dim)?;
        check_latent_dim("z", self.config.z_dim, dim)
    }

    /// `[V U mu]`, the loadings of the augmented factors.
    fn theta(p: &PldaParams) -> DMatrix<f64> {
        let (y_dim, z_dim) = (p.v.ncols(), p.u.ncols());
        let mut theta = DMatrix::zeros(p.mu.len(), y_dim + z_dim + 1);
        theta.columns_mut(0, y_dim).copy_from(&p.v);
        theta.columns_mut(y_dim, z_dim).copy_from(&p.u);
        theta.set_column(y_dim + z_dim, &p.mu);
        theta
    }
}

impl PldaModel for Plda {
    type Stats = PldaStats;

    const TYPE: PldaType = PldaType::Plda;

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
        check_latent_dim("z", self.config.z_dim, x_dim)?;
        let (mu, sb, sw) = data.scatter();
        let v = top_k_factor(&sb, self.config.y_dim)?;
        let (u, d) = within_factor(&sw, self.config.z_dim)?;
        self.config.x_dim = x_dim;
        self.params = Some(PldaParams { mu, v, u, d });
        Ok(())
    }

    fn estep(&self, data: &TrainData) -> Result<PldaStats, PdfError> {
        let p = self.params()?;
        let (y_dim, z_dim) = (self.config.y_dim, self.config.z_dim);
        let dim = data.x_dim();
        let n_samples = data.num_samples();
        let n_classes = data.num_classes();
        let ids = data.class_ids();

        let dv = DMatrix::from_fn(dim, y_dim, |r, c| p.d[r] * p.v[(r, c)]);
        let du = DMatrix::from_fn(dim, z_dim, |r, c| p.d[r] * p.u[(r, c)]);
        let vtdv = p.v.transpose() * &dv;
        let vtdu = p.v.transpose() * &du;
        let (cz, logdet_lz) = invert_pdmat(&(DMatrix::identity(z_dim, z_dim) + p.u.transpose() * &du))?;

        let xc = center_rows(data.x(), &p.mu)?;
        let xdu = &xc * &du;
        let mut fc = data.f().clone();
        for (c, mut row) in fc.row_iter_mut().enumerate() {
            row -= p.mu.transpose() * data.counts()[c];
        }
        let fdv = &fc * &dv;

        let mut cy_by_count: HashMap<usize, (DMatrix<f64>, f64)> = HashMap::new();
        let mut y_hat = DMatrix::zeros(n_classes, y_dim);
        let mut z_hat = DMatrix::<f64>::zeros(n_samples, z_dim);
        let mut z_class = DMatrix::zeros(n_classes, z_dim);
        for _ in 0..VB_ITERS {
            z_class.fill(0.0);
            for (row, &c) in z_hat.row_iter().zip(ids.iter()) {
                let mut acc = z_class.row_mut(c);
                acc += row;
            }
            for c in 0..n_classes {
                let n = data.counts()[c];
                let (cy, _) = match cy_by_count.entry(n as usize) {
                    Entry::Occupied(e) => e.into_mut(),
                    Entry::Vacant(e) => e.insert(invert_pdmat(&(DMatrix::identity(y_dim, y_dim) + &vtdv * n))?),
                };
                let rhs = fdv.row(c).transpose() - &vtdu * z_class.row(c).transpose();
                y_hat.set_row(c, &(&*cy * rhs).transpose());
            }
            let y_per_sample = DMatrix::from_fn(n_samples, y_dim, |j, k| y_hat[(ids[j], k)]);
            z_hat = (&xdu - y_per_sample * &vtdu) * &cz;
        }
        z_class.fill(0.0);
        for (row, &c) in z_hat.row_iter().zip(ids.iter()) {
            let mut acc = z_class.row_mut(c);
            acc += row;
        }

        let n = n_samples as f64;
        let mut ry = DMatrix::zeros(y_dim, y_dim);
        let mut py = DMatrix::zeros(y_dim, y_dim);
        let mut ry1 = DVector::zeros(y_dim);
        let mut kl = 0.0;
        for c in 0..n_classes {
            let nc = data.counts()[c];
            let (cy, logdet_ly) = cy_by_count
                .get(&(nc as usize))
                .ok_or(PdfError::NotInitialized)?;
            let y = y_hat.row(c).transpose();
            let eyy = cy + &y * y.transpose();
            ry += &eyy * nc;
            py += &eyy;
            ry1 += &y * nc;
            kl += 0.5 * (cy.trace() + y.dot(&y) - y_dim as f64 + logdet_ly);
        }
        let zz = z_hat.transpose() * &z_hat;
        kl += 0.5 * (n * cz.trace() + zz.trace() - n * z_dim as f64 + n * logdet_lz);
        let rz = &cz * n + zz;
        let z_sum = z_hat.row_sum().transpose();
        let ryz = y_hat.transpose() * &z_class;

        let a = y_dim + z_dim + 1;
        let mut ra = DMatrix::zeros(a, a);
        ra.view_mut((0, 0), (y_dim, y_dim)).copy_from(&ry);
        ra.view_mut((0, y_dim), (y_dim, z_dim)).copy_from(&ryz);
        ra.view_mut((y_dim, 0), (z_dim, y_dim)).copy_from(&ryz.transpose());
        ra.view_mut((y_dim, y_dim), (z_dim, z_dim)).copy_from(&rz);
        ra.view_mut((0, a - 1), (y_dim, 1)).copy_from(&ry1);
        ra.view_mut((a - 1, 0), (1, y_dim)).copy_from(&ry1.transpose());
        ra.view_mut((y_dim, a - 1), (z_dim, 1)).copy_from(&z_sum);
        ra.view_mut((a - 1, y_dim), (1, z_dim)).copy_from(&z_sum.transpose());
        ra[(a - 1, a - 1)] = n;
        symmetrize(&mut ra);

        let mut ca = DMatrix::zeros(dim, a);
        ca.columns_mut(0, y_dim).copy_from(&(data.f().transpose() * &y_hat));
        ca.columns_mut(y_dim, z_dim).copy_from(&(data.x().transpose() * &z_hat));
        ca.set_column(a - 1, data.f_tot());

        Ok(PldaStats {
            ra,
            ca,
            y_sum: y_hat.row_sum().transpose(),
            py,
            kl,
        })
    }

    fn elbo(&self, data: &TrainData, stats: &PldaStats) -> Result<f64, PdfError> {
        let p = self.params()?;
        let n = data.num_samples() as f64;
        let dim = data.x_dim() as f64;
        let theta = Self::theta(p);
        let tc = &theta * stats.ca.transpose();
        let q = data.s() - &tc - tc.transpose() + &theta * &stats.ra * theta.transpose();
        let tr_dq: f64 = p.d.iter().zip(q.diagonal().iter()).map(|(d, q)| d * q).sum();
        let logdet_d: f64 = p.d.iter().map(|v| v.ln()).sum();
        let llk = 0.5 * n * logdet_d - 0.5 * n * dim * LOG_2PI - 0.5 * tr_dq;
        Ok(llk - stats.kl)
    }

    fn mstep_ml(&mut self, data: &TrainData, stats: &PldaStats) -> Result<(), PdfError> {
        let (y_dim, z_dim) = (self.config.y_dim, self.config.z_dim);
        let n = data.num_samples() as f64;
        let (ra_inv, _) = invert_pdmat(&stats.ra)?;
        let theta = &stats.ca * ra_inv;
        let resid = data.s() - &theta * stats.ca.transpose();
        let d = resid.diagonal().map(|v| 1.0 / (v / n).max(SCATTER_FLOOR));

        self.params = Some(PldaParams {
            mu: theta.column(y_dim + z_dim).into_owned(),
            v: theta.columns(0, y_dim).into_owned(),
            u: theta.columns(y_dim, z_dim).into_owned(),
            d,
        });
        Ok(())
    }

    fn mstep_md(&mut self, data: &TrainData, stats: &PldaStats) -> Result<(), PdfError> {
        let (y_dim, z_dim) = (self.config.y_dim, self.config.z_dim);
        let m = data.num_classes() as f64;
        let n = data.num_samples() as f64;

        let mu_y = &stats.y_sum / m;
        let mut cov_y = &stats.py / m - &mu_y * mu_y.transpose();
        symmetrize(&mut cov_y);
        let mu_z = stats.ra.view((y_dim, y_dim + z_dim), (z_dim, 1)).column(0).clone_owned() / n;
        let mut cov_z = stats.ra.view((y_dim, y_dim), (z_dim, z_dim)).clone_owned() / n - &mu_z * mu_z.transpose();
        symmetrize(&mut cov_z);
        let chol_y = chol_lower(&cov_y)?;
        let chol_z = chol_lower(&cov_z)?;

        let p = self.params.as_mut().ok_or(PdfError::NotInitialized)?;
        p.mu += &p.v * mu_y + &p.u * mu_z;
        p.v = &p.v * chol_y;
        p.u = &p.u * chol_z;
        Ok(())
    }

    fn between_within(&self) -> Result<(DMatrix<f64>, DMatrix<f64>), PdfError> {
        let p = self.params()?;
        let mut sb = &p.v * p.v.transpose();
        symmetrize(&mut sb);
        let mut sw = &p.u * p.u.transpose() + DMatrix::from_diagonal(&p.d.map(|v| 1.0 / v));
        symmetrize(&mut sw);
        Ok((sb, sw))
    }

    fn weighted_avg_model(&self, other: &Self, w_mu: f64, w_b: f64, w_w: f64) -> Result<Self, PdfError> {
        check_avg_compatible(&self.config, &other.config, [w_mu, w_b, w_w])?;
        let a = self.params()?;
        let b = other.params()?;

        let v = if w_b == 1.0 {
            a.v.clone()
        } else if w_b == 0.0 {
            b.v.clone()
        } else {
            let sb = &a.v * a.v.transpose() * w_b + &b.v * b.v.transpose() * (1.0 - w_b);
            top_k_factor(&sb, self.config.y_dim)?
        };
        let (u, d) = if w_w == 1.0 {
            (a.u.clone(), a.d.clone())
        } else if w_w == 0.0 {
            (b.u.clone(), b.d.clone())
        } else {
            let (_, sw_a) = self.between_within()?;
            let (_, sw_b) = other.between_within()?;
            within_factor(&(sw_a * w_w + sw_b * (1.0 - w_w)), self.config.z_dim)?
        };

        Ok(Self {
            config: self.config.clone(),
            params: Some(PldaParams {
                mu: blend_vector(&a.mu, &b.mu, w_mu),
                v,
                u,
                d,
            }),
        })
    }

    fn save_params(&self, store: &mut ModelStore) -> Result<(), PdfError> {
        let p = self.params()?;
        let name = &self.config.name;
        store.put_vector(ModelStore::key(name, "mu"), &p.mu)?;
        store.put_matrix(ModelStore::key(name, "V"), &p.v)?;
        store.put_matrix(ModelStore::key(name, "U"), &p.u)?;
        store.put_vector(ModelStore::key(name, "D"), &p.d)?;
        Ok(())
    }

    fn load_params(store: &ModelStore, config: PldaConfig) -> Result<Self, PdfError> {
        let name = &config.name;
        let params = PldaParams {
            mu: store.get_vector(&ModelStore::key(name, "mu"))?,
            v: store.get_matrix(&ModelStore::key(name, "V"))?,
            u: store.get_matrix(&ModelStore::key(name, "U"))?,
            d: store.get_vector(&ModelStore::key(name, "D"))?,
        };
        let model = Self {
            config,
            params: Some(params),
        };
        model.validate()?;
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plda::FitOptions;
    use crate::plda::testdata::classes;

    fn fitted(seed: u64) -> (Plda, DMatrix<f64>, Vec<f64>) {
        let (x, ids) = classes(8, 10, 5, seed);
        let mut model = Plda::new(3, 2, "plda");
        let trace = model.fit(&x, &ids, &FitOptions::with_epochs(10)).unwrap();
        (model, x, trace)
    }

    #[test]
    fn within_factor_reconstructs_low_rank_plus_noise() {
        let u_true = DMatrix::from_row_slice(3, 1, &[2.0, 1.0, 0.0]);
        let sw = &u_true * u_true.transpose() + DMatrix::identity(3, 3) * 0.5;
        let (u, d) = within_factor(&sw, 1).unwrap();
        let rebuilt = &u * u.transpose() + DMatrix::from_diagonal(&d.map(|v| 1.0 / v));
        assert!((rebuilt - sw).norm() < 1e-9);
    }

    #[test]
    fn fit_improves_elbo() {
        let (model, _, trace) = fitted(21);
        assert_eq!(trace.len(), 10);
        assert!(trace[9] >= trace[0], "{} -> {}", trace[0], trace[9]);
        assert!(trace.iter().all(|v| v.is_finite()));
        let p = model.params().unwrap();
        assert!(p.d.iter().all(|v| *v > 0.0));
        assert_eq!(p.u.shape(), (5, 2));
    }

    #[test]
    fn llr_symmetric() {
        let (model, x, _) = fitted(8);
        let s = model.llr_1vs1(&x, &x).unwrap();
        for i in 0..x.nrows() {
            for j in 0..i {
                assert!((s[(i, j)] - s[(j, i)]).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn weighted_avg_end_points() {
        let (a, _, _) = fitted(1);
        let (b, _, _) = fitted(2);
        assert_eq!(a.weighted_avg_model(&b, 1.0, 1.0, 1.0).unwrap(), a);
        let other_side = a.weighted_avg_model(&b, 0.0, 0.0, 0.0).unwrap();
        assert_eq!(other_side.params().unwrap(), b.params().unwrap());
        let mid = a.weighted_avg_model(&b, 0.5, 0.3, 0.7).unwrap();
        assert_eq!(mid.params().unwrap().u.shape(), (5, 2));
    }

    #[test]
    fn z_dim_too_large() {
        let (x, ids) = classes(4, 4, 3, 0);
        let mut model = Plda::new(2, 4, "plda");
        let err = model.fit(&x, &ids, &FitOptions::with_epochs(1)).unwrap_err();
        assert!(matches!(err, PdfError::LatentDimTooLarge { what: "z", dim: 4, x_dim: 3 }));
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plda.json");
        let (model, x, _) = fitted(3);
        model.save(&path).unwrap();
        let loaded = Plda::load(&path).unwrap();
        assert_eq!(loaded, model);
        assert_eq!(loaded.z_dim(), 2);
        assert_eq!(loaded.llr_1vs1(&x, &x).unwrap(), model.llr_1vs1(&x, &x).unwrap());
    }
}
