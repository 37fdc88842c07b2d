use std::collections::HashMap;
use std::collections::hash_map::Entry;

use hyperion_math::densify;
use hyperion_math::linalg::{center_rows, invert_pdmat, symmetrize};
use nalgebra::{DMatrix, DVector};

use crate::PdfError;

/// Two-covariance log-likelihood ratio scoring.
///
/// Under the same-class hypothesis two vectors share a class mean drawn from
/// `N(mu, Sb)`, each with independent `N(0, Sw)` noise; under the
/// different-class hypothesis the class means are independent.
#[derive(Debug, Clone)]
pub struct TwoCovScorer {
    mu: DVector<f64>,
    sb: DMatrix<f64>,
    sw: DMatrix<f64>,
    /// `(Sb + Sw)⁻¹`
    t_inv: DMatrix<f64>,
    logdet_t: f64,
    p: DMatrix<f64>,
    q: DMatrix<f64>,
    c: f64,
}

impl TwoCovScorer {
    pub fn new(mu: DVector<f64>, sb: DMatrix<f64>, sw: DMatrix<f64>) -> Result<Self, PdfError> {
        let dim = mu.len();
        for m in [&sb, &sw] {
            if m.nrows() != dim || m.ncols() != dim {
                return Err(PdfError::DimensionMismatch {
                    expected: dim,
                    got: m.nrows(),
                });
            }
        }
        let t = &sb + &sw;
        let (t_inv, logdet_t) = invert_pdmat(&t)?;
        let mut k = &t - &sb * &t_inv * &sb;
        symmetrize(&mut k);
        let (a, logdet_k) = invert_pdmat(&k)?;
        let mut q = &t_inv - &a;
        symmetrize(&mut q);
        let mut p = &t_inv * &sb * &a;
        symmetrize(&mut p);
        let c = 0.5 * logdet_t - 0.5 * logdet_k;
        Ok(Self {
            mu,
            sb,
            sw,
            t_inv,
            logdet_t,
            p,
            q,
            c,
        })
    }

    pub fn x_dim(&self) -> usize {
        self.mu.len()
    }

    fn quad_diag(m: &DMatrix<f64>, x: &DMatrix<f64>) -> DVector<f64> {
        let xm = x * m;
        DVector::from_iterator(x.nrows(), (0..x.nrows()).map(|i| xm.row(i).dot(&x.row(i))))
    }

    /// Gain `G`, predictive precision and its log-determinant for `n`
    /// enrollment samples.
    fn enrollment_terms(&self, n: usize) -> Result<(DMatrix<f64>, DMatrix<f64>, f64), PdfError> {
        let (inv, _) = invert_pdmat(&(&self.sb + &self.sw / n as f64))?;
        let gain = &self.sb * inv;
        let mut pred = &self.sb - &gain * &self.sb + &self.sw;
        symmetrize(&mut pred);
        let (pred_inv, logdet) = invert_pdmat(&pred)?;
        Ok((gain, pred_inv, logdet))
    }

    /// LLR matrix with one row per row of `x1` and one column per row of `x2`.
    pub fn llr_1vs1(&self, x1: &DMatrix<f64>, x2: &DMatrix<f64>) -> Result<DMatrix<f64>, PdfError> {
        let x1 = center_rows(x1, &self.mu)?;
        let x2 = center_rows(x2, &self.mu)?;
        let q1 = Self::quad_diag(&self.q, &x1);
        let q2 = Self::quad_diag(&self.q, &x2);
        let mut scores = &x1 * &self.p * x2.transpose();
        for i in 0..scores.nrows() {
            for j in 0..scores.ncols() {
                scores[(i, j)] += 0.5 * q1[i] + 0.5 * q2[j] + self.c;
            }
        }
        Ok(scores)
    }

    /// Exact multi-enrollment LLR. Rows of `x1` are grouped by
    /// `class_ids1`; the result has one row per (dense) class.
    ///
    /// The class mean posterior given `n` enrollment samples with average
    /// `x̄` is `N(mu + G(x̄ − mu), Sb − G Sb)` with `G = Sb (Sb + Sw/n)⁻¹`.
    pub fn llr_nvs1(
        &self,
        x1: &DMatrix<f64>,
        class_ids1: &[usize],
        x2: &DMatrix<f64>,
    ) -> Result<DMatrix<f64>, PdfError> {
        if class_ids1.len() != x1.nrows() {
            return Err(PdfError::LabelCountMismatch {
                labels: class_ids1.len(),
                samples: x1.nrows(),
            });
        }
        let dim = self.x_dim();
        let (ids, num_classes) = densify(class_ids1);
        let x1 = center_rows(x1, &self.mu)?;
        let x2 = center_rows(x2, &self.mu)?;

        let mut counts = vec![0usize; num_classes];
        let mut sums = DMatrix::zeros(num_classes, dim);
        for (row, &c) in x1.row_iter().zip(ids.iter()) {
            counts[c] += 1;
            let mut acc = sums.row_mut(c);
            acc += row;
        }

        let null = Self::quad_diag(&self.t_inv, &x2).map(|q| -0.5 * q - 0.5 * self.logdet_t);

        // gain and predictive precision only depend on the enrollment count
        let mut by_count: HashMap<usize, (DMatrix<f64>, DMatrix<f64>, f64)> = HashMap::new();
        let mut scores = DMatrix::zeros(num_classes, x2.nrows());
        for c in 0..num_classes {
            let n = counts[c];
            let (gain, pred_inv, logdet) = match by_count.entry(n) {
                Entry::Occupied(e) => e.into_mut(),
                Entry::Vacant(e) => e.insert(self.enrollment_terms(n)?),
            };
            let mean = &*gain * sums.row(c).transpose() / n as f64;
            let diff = &x2 - DMatrix::from_fn(x2.nrows(), dim, |_, j| mean[j]);
            let quad = Self::quad_diag(pred_inv, &diff);
            for j in 0..x2.nrows() {
                scores[(c, j)] = -0.5 * quad[j] - 0.5 * *logdet - null[j];
            }
        }
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyperion_math::LOG_2PI;

    fn scorer() -> TwoCovScorer {
        let mu = DVector::from_vec(vec![0.5, -0.5, 1.0]);
        let sb = DMatrix::from_row_slice(3, 3, &[2.0, 0.3, 0.0, 0.3, 1.0, 0.1, 0.0, 0.1, 0.5]);
        let sw = DMatrix::from_row_slice(3, 3, &[1.0, 0.0, 0.2, 0.0, 0.8, 0.0, 0.2, 0.0, 1.5]);
        TwoCovScorer::new(mu, sb, sw).unwrap()
    }

    fn probe() -> DMatrix<f64> {
        DMatrix::from_row_slice(
            4,
            3,
            &[1.0, 0.0, 0.5, -1.0, 2.0, 0.0, 0.3, 0.3, 0.3, 2.0, -1.0, 1.5],
        )
    }

    #[test]
    fn llr_matches_gaussian_ratio() {
        // direct evaluation of the joint Gaussians for one pair
        let s = scorer();
        let x = probe();
        let llr = s.llr_1vs1(&x.rows(0, 1).into_owned(), &x.rows(1, 1).into_owned()).unwrap()[(0, 0)];

        let t = &s.sb + &s.sw;
        let mut joint = DMatrix::zeros(6, 6);
        joint.view_mut((0, 0), (3, 3)).copy_from(&t);
        joint.view_mut((3, 3), (3, 3)).copy_from(&t);
        joint.view_mut((0, 3), (3, 3)).copy_from(&s.sb);
        joint.view_mut((3, 0), (3, 3)).copy_from(&s.sb);
        let mut z = DVector::zeros(6);
        for j in 0..3 {
            z[j] = x[(0, j)] - s.mu[j];
            z[3 + j] = x[(1, j)] - s.mu[j];
        }
        let log_n = |cov: &DMatrix<f64>, v: &DVector<f64>| {
            let (inv, logdet) = invert_pdmat(cov).unwrap();
            -0.5 * (v.len() as f64) * LOG_2PI - 0.5 * logdet - 0.5 * (v.transpose() * inv * v)[(0, 0)]
        };
        let z1 = z.rows(0, 3).into_owned();
        let z2 = z.rows(3, 3).into_owned();
        let expected = log_n(&joint, &z) - log_n(&t, &z1) - log_n(&t, &z2);
        assert!((llr - expected).abs() < 1e-10, "llr={llr} expected={expected}");
    }

    #[test]
    fn llr_symmetric() {
        let s = scorer();
        let x1 = probe();
        let x2 = probe().rows(1, 3).into_owned();
        let a = s.llr_1vs1(&x1, &x2).unwrap();
        let b = s.llr_1vs1(&x2, &x1).unwrap();
        for i in 0..4 {
            for j in 0..3 {
                assert!((a[(i, j)] - b[(j, i)]).abs() < 1e-10);
            }
        }
    }

    #[test]
    fn nvs1_with_one_sample_matches_1vs1() {
        let s = scorer();
        let x = probe();
        let one = s.llr_1vs1(&x, &x).unwrap();
        let many = s.llr_nvs1(&x, &[0, 1, 2, 3], &x).unwrap();
        for i in 0..4 {
            for j in 0..4 {
                assert!(
                    (one[(i, j)] - many[(i, j)]).abs() < 1e-9,
                    "[{i},{j}] {} vs {}",
                    one[(i, j)],
                    many[(i, j)]
                );
            }
        }
    }

    #[test]
    fn nvs1_groups_classes() {
        let s = scorer();
        let x = probe();
        let scores = s.llr_nvs1(&x, &[5, 9, 5, 9], &x).unwrap();
        assert_eq!(scores.shape(), (2, 4));
        assert!(matches!(
            s.llr_nvs1(&x, &[0, 1], &x),
            Err(PdfError::LabelCountMismatch { labels: 2, samples: 4 })
        ));
    }
}
