use hyperion_math::densify;
use hyperion_math::linalg::symmetrize;
use nalgebra::{DMatrix, DVector};

use crate::TransformError;

/// Global mean plus between-class and within-class scatter matrices.
#[derive(Debug, Clone, PartialEq)]
pub struct SbSw {
    pub mu: DVector<f64>,
    pub sb: DMatrix<f64>,
    pub sw: DMatrix<f64>,
}

/// Samples grouped by dense class id.
struct ClassGroups {
    ids: Vec<usize>,
    counts: Vec<usize>,
    /// One row per class.
    means: DMatrix<f64>,
}

impl ClassGroups {
    fn new(x: &DMatrix<f64>, class_ids: &[usize]) -> Result<Self, TransformError> {
        if class_ids.len() != x.nrows() {
            return Err(TransformError::LabelCountMismatch {
                labels: class_ids.len(),
                samples: x.nrows(),
            });
        }
        if x.nrows() == 0 {
            return Err(TransformError::Invalid("no samples".to_string()));
        }
        let (ids, num_classes) = densify(class_ids);
        let mut counts = vec![0usize; num_classes];
        let mut means = DMatrix::zeros(num_classes, x.ncols());
        for (row, &c) in x.row_iter().zip(ids.iter()) {
            counts[c] += 1;
            let mut acc = means.row_mut(c);
            acc += row;
        }
        for (c, mut row) in means.row_iter_mut().enumerate() {
            row /= counts[c] as f64;
        }
        Ok(Self { ids, counts, means })
    }

    fn num_classes(&self) -> usize {
        self.counts.len()
    }

    /// `Σ (x − m_c)(x − m_c)ᵀ / N`
    fn within(&self, x: &DMatrix<f64>) -> DMatrix<f64> {
        let mut centered = x.clone();
        for (mut row, &c) in centered.row_iter_mut().zip(self.ids.iter()) {
            row -= self.means.row(c);
        }
        let mut sw = centered.transpose() * &centered / x.nrows() as f64;
        symmetrize(&mut sw);
        sw
    }

    fn total_mean(&self) -> DVector<f64> {
        let n: usize = self.counts.iter().sum();
        let mut mu = DVector::zeros(self.means.ncols());
        for (row, &count) in self.means.row_iter().zip(self.counts.iter()) {
            mu += row.transpose() * count as f64;
        }
        mu / n as f64
    }
}

impl SbSw {
    /// Between-class scatter is the unweighted covariance of the class means
    /// around the global mean; within-class scatter is normalized by the
    /// number of samples.
    pub fn fit(x: &DMatrix<f64>, class_ids: &[usize]) -> Result<Self, TransformError> {
        let groups = ClassGroups::new(x, class_ids)?;
        let mu = groups.total_mean();
        let mut sb = DMatrix::zeros(x.ncols(), x.ncols());
        for row in groups.means.row_iter() {
            let delta = row.transpose() - &mu;
            sb += &delta * delta.transpose();
        }
        sb /= groups.num_classes() as f64;
        symmetrize(&mut sb);
        Ok(Self {
            mu,
            sb,
            sw: groups.within(x),
        })
    }
}

/// Nearest-neighbour scatter for NDA.
///
/// The between-class scatter only looks at each class mean's `k` nearest
/// other class means. Pairs are weighted by
/// `min(s_i^α, s_j^α) / (s_i^α + s_j^α)`, where `s_i` is the distance from
/// class `i` to its `k`-th neighbour, so pairs near a class boundary count
/// more than isolated ones.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NSbSw {
    pub k: usize,
    pub alpha: f64,
}

impl Default for NSbSw {
    fn default() -> Self {
        Self { k: 10, alpha: 1.0 }
    }
}

impl NSbSw {
    pub fn new(k: usize, alpha: f64) -> Self {
        Self { k, alpha }
    }

    pub fn fit(&self, x: &DMatrix<f64>, class_ids: &[usize]) -> Result<SbSw, TransformError> {
        if self.k == 0 {
            return Err(TransformError::Invalid("k must be positive".to_string()));
        }
        let groups = ClassGroups::new(x, class_ids)?;
        let m = groups.num_classes();
        if m < 2 {
            return Err(TransformError::Invalid(format!("{m} class(es), need at least 2")));
        }
        let k = self.k.min(m - 1);

        let neighbours: Vec<Vec<(f64, usize)>> = (0..m)
            .map(|i| {
                let mut d: Vec<(f64, usize)> = (0..m)
                    .filter(|&j| j != i)
                    .map(|j| ((groups.means.row(i) - groups.means.row(j)).norm(), j))
                    .collect();
                d.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
                d.truncate(k);
                d
            })
            .collect();
        let scale: Vec<f64> = neighbours
            .iter()
            .map(|n| n.last().map_or(0.0, |&(d, _)| d.powf(self.alpha)))
            .collect();

        let dim = x.ncols();
        let mut sb = DMatrix::zeros(dim, dim);
        let mut total_weight = 0.0;
        for (i, neigh) in neighbours.iter().enumerate() {
            for &(_, j) in neigh {
                let denom = scale[i] + scale[j];
                let w = if denom > 0.0 { scale[i].min(scale[j]) / denom } else { 0.5 };
                let delta = (groups.means.row(i) - groups.means.row(j)).transpose();
                sb += &delta * delta.transpose() * w;
                total_weight += w;
            }
        }
        if total_weight > 0.0 {
            sb /= total_weight;
        }
        symmetrize(&mut sb);

        Ok(SbSw {
            mu: groups.total_mean(),
            sb,
            sw: groups.within(x),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_classes() -> (DMatrix<f64>, Vec<usize>) {
        let x = DMatrix::from_row_slice(4, 2, &[1.0, 0.0, 3.0, 0.0, 0.0, 2.0, 0.0, 4.0]);
        (x, vec![7, 7, 2, 2])
    }

    #[test]
    fn sb_sw_small() {
        let (x, ids) = two_classes();
        let s = SbSw::fit(&x, &ids).unwrap();
        assert_eq!(s.mu, DVector::from_vec(vec![1.0, 1.5]));
        assert!((s.sb[(0, 0)] - 1.0).abs() < 1e-12);
        assert!((s.sb[(1, 1)] - 2.25).abs() < 1e-12);
        assert!((s.sb[(0, 1)] + 1.5).abs() < 1e-12);
        assert!((s.sw[(0, 0)] - 0.5).abs() < 1e-12);
        assert!((s.sw[(1, 1)] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn nearest_neighbour_with_all_classes() {
        // balanced classes, every pair a neighbour, alpha 0 gives equal weights
        let x = DMatrix::from_row_slice(
            6,
            2,
            &[0.0, 0.0, 0.2, 0.0, 4.0, 1.0, 4.2, 1.0, -1.0, 3.0, -1.2, 3.0],
        );
        let ids = vec![0, 0, 1, 1, 2, 2];
        let plain = SbSw::fit(&x, &ids).unwrap();
        let nn = NSbSw::new(5, 0.0).fit(&x, &ids).unwrap();
        let expected = &plain.sb * 3.0;
        assert!((nn.sb - expected).norm() < 1e-10);
        assert_eq!(nn.sw, plain.sw);
        assert_eq!(nn.mu, plain.mu);
    }

    #[test]
    fn rejects_bad_input() {
        let (x, _) = two_classes();
        assert!(matches!(
            SbSw::fit(&x, &[0, 1]),
            Err(TransformError::LabelCountMismatch { labels: 2, samples: 4 })
        ));
        assert!(NSbSw::default().fit(&x, &[0, 0, 0, 0]).is_err());
        assert!(NSbSw::new(0, 1.0).fit(&x, &[0, 0, 1, 1]).is_err());
    }
}
