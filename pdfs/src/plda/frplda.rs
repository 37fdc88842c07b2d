use std::collections::HashMap;
use std::collections::hash_map::Entry;

use hyperion_io::ModelStore;
use hyperion_math::LOG_2PI;
use hyperion_math::linalg::{floor_eigenvalues, invert_pdmat, logdet_pdmat, symmetrize};
use nalgebra::{DMatrix, DVector};

use super::{
    PldaConfig, PldaModel, PldaType, SCATTER_FLOOR, TrainData, blend_matrix, blend_vector,
    check_avg_compatible,
};
use crate::PdfError;

/// Parameters of a full-rank PLDA: `y ~ N(mu, B⁻¹)`, `x = y + ε`,
/// `ε ~ N(0, W⁻¹)`.
#[derive(Debug, Clone, PartialEq)]
pub struct FrPldaParams {
    pub mu: DVector<f64>,
    /// Between-class precision.
    pub b: DMatrix<f64>,
    /// Within-class precision.
    pub w: DMatrix<f64>,
}

/// Full-rank PLDA. The class variable lives in feature space, so `y_dim`
/// always equals the feature dimension once trained.
#[derive(Debug, Clone, PartialEq)]
pub struct FrPlda {
    config: PldaConfig,
    params: Option<FrPldaParams>,
}

#[derive(Debug, Clone)]
pub struct FrPldaStats {
    y_sum: DVector<f64>,
    /// `Σ_i E[y_i y_iᵀ]`
    py: DMatrix<f64>,
    /// `Σ_i n_i E[y_i y_iᵀ]`
    ry: DMatrix<f64>,
    /// `Σ_i F_i E[y_i]ᵀ`
    cy: DMatrix<f64>,
    kl: f64,
}

impl FrPlda {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            config: PldaConfig::new(name, 0, 0),
            params: None,
        }
    }

    pub fn params(&self) -> Result<&FrPldaParams, PdfError> {
        self.params.as_ref().ok_or(PdfError::NotInitialized)
    }

    fn validate(&self) -> Result<(), PdfError> {
        let p = self.params()?;
        let d = self.config.x_dim;
        for (expected, got) in [
            (d, p.mu.len()),
            (d, self.config.y_dim),
            (d, p.b.nrows()),
            (d, p.b.ncols()),
            (d, p.w.nrows()),
            (d, p.w.ncols()),
        ] {
            if expected != got {
                return Err(PdfError::DimensionMismatch { expected, got });
            }
        }
        Ok(())
    }
}

impl PldaModel for FrPlda {
    type Stats = FrPldaStats;

    const TYPE: PldaType = PldaType::FrPlda;

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
        let (mu, sb, sw) = data.scatter();
        let (b, _) = invert_pdmat(&floor_eigenvalues(&sb, SCATTER_FLOOR)?)?;
        let (w, _) = invert_pdmat(&floor_eigenvalues(&sw, SCATTER_FLOOR)?)?;
        self.config.x_dim = data.x_dim();
        self.config.y_dim = data.x_dim();
        self.params = Some(FrPldaParams { mu, b, w });
        Ok(())
    }

    fn estep(&self, data: &TrainData) -> Result<FrPldaStats, PdfError> {
        let p = self.params()?;
        let d = data.x_dim();
        let b_mu = &p.b * &p.mu;
        let logdet_b = logdet_pdmat(&p.b)?;

        let mut stats = FrPldaStats {
            y_sum: DVector::zeros(d),
            py: DMatrix::zeros(d, d),
            ry: DMatrix::zeros(d, d),
            cy: DMatrix::zeros(d, d),
            kl: 0.0,
        };
        let mut by_count: HashMap<usize, (DMatrix<f64>, f64)> = HashMap::new();
        for c in 0..data.num_classes() {
            let n = data.counts()[c];
            let (l_inv, logdet_l) = match by_count.entry(n as usize) {
                Entry::Occupied(e) => e.into_mut(),
                Entry::Vacant(e) => e.insert(invert_pdmat(&(&p.b + &p.w * n))?),
            };
            let l_inv = &*l_inv;
            let fc = data.class_sum(c);
            let y = l_inv * (&b_mu + &p.w * &fc);
            let eyy = l_inv + &y * y.transpose();
            let dy = &y - &p.mu;

            stats.y_sum += &y;
            stats.py += &eyy;
            stats.ry += &eyy * n;
            stats.cy += &fc * y.transpose();
            stats.kl += 0.5
                * ((&p.b * l_inv).trace() + (dy.transpose() * &p.b * &dy)[(0, 0)] - d as f64 + *logdet_l
                    - logdet_b);
        }
        symmetrize(&mut stats.py);
        symmetrize(&mut stats.ry);
        Ok(stats)
    }

    fn elbo(&self, data: &TrainData, stats: &FrPldaStats) -> Result<f64, PdfError> {
        let p = self.params()?;
        let n = data.num_samples() as f64;
        let d = data.x_dim() as f64;
        let logdet_w = logdet_pdmat(&p.w)?;
        let q = data.s() - &stats.cy - stats.cy.transpose() + &stats.ry;
        let tr_wq = p.w.component_mul(&q).sum();
        let llk = 0.5 * n * logdet_w - 0.5 * n * d * LOG_2PI - 0.5 * tr_wq;
        Ok(llk - stats.kl)
    }

    fn mstep_ml(&mut self, data: &TrainData, stats: &FrPldaStats) -> Result<(), PdfError> {
        let n = data.num_samples() as f64;
        let m = data.num_classes() as f64;
        let mu = &stats.y_sum / m;
        let mut sb = &stats.py / m - &mu * mu.transpose();
        symmetrize(&mut sb);
        let mut sw = (data.s() - &stats.cy - stats.cy.transpose() + &stats.ry) / n;
        symmetrize(&mut sw);
        let (b, _) = invert_pdmat(&sb)?;
        let (w, _) = invert_pdmat(&sw)?;
        self.params = Some(FrPldaParams { mu, b, w });
        Ok(())
    }

    /// No-op for the full-rank model.
    fn mstep_md(&mut self, _data: &TrainData, _stats: &FrPldaStats) -> Result<(), PdfError> {
        Ok(())
    }

    fn between_within(&self) -> Result<(DMatrix<f64>, DMatrix<f64>), PdfError> {
        let p = self.params()?;
        let (sb, _) = invert_pdmat(&p.b)?;
        let (sw, _) = invert_pdmat(&p.w)?;
        Ok((sb, sw))
    }

    fn weighted_avg_model(&self, other: &Self, w_mu: f64, w_b: f64, w_w: f64) -> Result<Self, PdfError> {
        check_avg_compatible(&self.config, &other.config, [w_mu, w_b, w_w])?;
        let a = self.params()?;
        let b = other.params()?;

        let blend_precision = |pa: &DMatrix<f64>, pb: &DMatrix<f64>, w: f64| -> Result<DMatrix<f64>, PdfError> {
            if w == 1.0 || w == 0.0 {
                return Ok(blend_matrix(pa, pb, w));
            }
            let (ca, _) = invert_pdmat(pa)?;
            let (cb, _) = invert_pdmat(pb)?;
            Ok(invert_pdmat(&(ca * w + cb * (1.0 - w)))?.0)
        };

        Ok(Self {
            config: self.config.clone(),
            params: Some(FrPldaParams {
                mu: blend_vector(&a.mu, &b.mu, w_mu),
                b: blend_precision(&a.b, &b.b, w_b)?,
                w: blend_precision(&a.w, &b.w, w_w)?,
            }),
        })
    }

    fn save_params(&self, store: &mut ModelStore) -> Result<(), PdfError> {
        let p = self.params()?;
        let name = &self.config.name;
        store.put_vector(ModelStore::key(name, "mu"), &p.mu)?;
        store.put_matrix(ModelStore::key(name, "B"), &p.b)?;
        store.put_matrix(ModelStore::key(name, "W"), &p.w)?;
        Ok(())
    }

    fn load_params(store: &ModelStore, config: PldaConfig) -> Result<Self, PdfError> {
        let name = &config.name;
        let params = FrPldaParams {
            mu: store.get_vector(&ModelStore::key(name, "mu"))?,
            b: store.get_matrix(&ModelStore::key(name, "B"))?,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plda::FitOptions;
    use crate::plda::testdata::classes;

    fn fitted(seed: u64) -> (FrPlda, DMatrix<f64>) {
        let (x, ids) = classes(10, 8, 3, seed);
        let mut model = FrPlda::new("frplda");
        model.fit(&x, &ids, &FitOptions::with_epochs(8)).unwrap();
        (model, x)
    }

    #[test]
    fn elbo_does_not_decrease() {
        let (x, ids) = classes(10, 8, 3, 4);
        let mut model = FrPlda::new("frplda");
        let trace = model.fit(&x, &ids, &FitOptions::with_epochs(12)).unwrap();
        assert_eq!(trace.len(), 12);
        for pair in trace.windows(2) {
            assert!(pair[1] >= pair[0] - 1e-6, "{} -> {}", pair[0], pair[1]);
        }
        assert_eq!(model.y_dim(), 3);
    }

    #[test]
    fn llr_symmetric() {
        let (model, x) = fitted(2);
        let a = model.llr_1vs1(&x, &x).unwrap();
        for i in 0..x.nrows() {
            for j in 0..x.nrows() {
                assert!((a[(i, j)] - a[(j, i)]).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn weighted_avg_end_points() {
        let (a, _) = fitted(2);
        let (b, _) = fitted(3);
        assert_eq!(
            a.weighted_avg_model(&b, 1.0, 1.0, 1.0).unwrap().params().unwrap(),
            a.params().unwrap()
        );
        assert_eq!(
            a.weighted_avg_model(&b, 0.0, 0.0, 0.0).unwrap().params().unwrap(),
            b.params().unwrap()
        );
        let mixed = a.weighted_avg_model(&b, 1.0, 0.0, 1.0).unwrap();
        let p = mixed.params().unwrap();
        assert_eq!(p.mu, a.params().unwrap().mu);
        assert_eq!(p.b, b.params().unwrap().b);
        assert_eq!(p.w, a.params().unwrap().w);
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fr.json");
        let (model, x) = fitted(6);
        model.save(&path).unwrap();
        let loaded = FrPlda::load(&path).unwrap();
        assert_eq!(loaded, model);
        assert_eq!(loaded.llr_1vs1(&x, &x).unwrap(), model.llr_1vs1(&x, &x).unwrap());
    }
}
