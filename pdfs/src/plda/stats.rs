use hyperion_math::densify;
use hyperion_math::linalg::symmetrize;
use nalgebra::{DMatrix, DVector};

use crate::PdfError;

/// Training vectors grouped by class, with the zeroth, first and second
/// order statistics every variant needs.
#[derive(Debug, Clone)]
pub struct TrainData<'a> {
    x: &'a DMatrix<f64>,
    class_ids: Vec<usize>,
    /// Samples per class.
    counts: DVector<f64>,
    /// Per-class sums, one row per class.
    f: DMatrix<f64>,
    f_tot: DVector<f64>,
    /// `Σ x xᵀ` over all samples.
    s: DMatrix<f64>,
}

impl<'a> TrainData<'a> {
    /// Groups the rows of `x` by `class_ids`. Ids need not be dense.
    pub fn new(x: &'a DMatrix<f64>, class_ids: &[usize]) -> Result<Self, PdfError> {
        if class_ids.len() != x.nrows() {
            return Err(PdfError::LabelCountMismatch {
                labels: class_ids.len(),
                samples: x.nrows(),
            });
        }
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(PdfError::Validation("empty training data".to_string()));
        }
        let (class_ids, num_classes) = densify(class_ids);
        let dim = x.ncols();

        let mut counts = DVector::zeros(num_classes);
        let mut f = DMatrix::zeros(num_classes, dim);
        for (row, &c) in x.row_iter().zip(class_ids.iter()) {
            counts[c] += 1.0;
            let mut acc = f.row_mut(c);
            acc += row;
        }
        let f_tot = f.row_sum().transpose();
        let mut s = x.transpose() * x;
        symmetrize(&mut s);

        Ok(Self {
            x,
            class_ids,
            counts,
            f,
            f_tot,
            s,
        })
    }

    pub fn x(&self) -> &DMatrix<f64> {
        self.x
    }

    /// Dense class id of every sample.
    pub fn class_ids(&self) -> &[usize] {
        &self.class_ids
    }

    pub fn x_dim(&self) -> usize {
        self.x.ncols()
    }

    pub fn num_samples(&self) -> usize {
        self.x.nrows()
    }

    pub fn num_classes(&self) -> usize {
        self.counts.len()
    }

    pub fn counts(&self) -> &DVector<f64> {
        &self.counts
    }

    /// Per-class first order statistics, one row per class.
    pub fn f(&self) -> &DMatrix<f64> {
        &self.f
    }

    pub fn f_tot(&self) -> &DVector<f64> {
        &self.f_tot
    }

    pub fn s(&self) -> &DMatrix<f64> {
        &self.s
    }

    /// Sum of the samples of class `c`.
    pub fn class_sum(&self, c: usize) -> DVector<f64> {
        self.f.row(c).transpose()
    }

    /// Global mean, between-class covariance of the class means
    /// (unweighted) and within-class covariance.
    pub fn scatter(&self) -> (DVector<f64>, DMatrix<f64>, DMatrix<f64>) {
        let n = self.num_samples() as f64;
        let m = self.num_classes() as f64;
        let mu = &self.f_tot / n;

        let mut sb = DMatrix::zeros(self.x_dim(), self.x_dim());
        let mut sf = DMatrix::zeros(self.x_dim(), self.x_dim());
        for c in 0..self.num_classes() {
            let fc = self.class_sum(c);
            let mean = &fc / self.counts[c];
            let delta = &mean - &mu;
            sb += &delta * delta.transpose();
            sf += &fc * mean.transpose();
        }
        sb /= m;
        let mut sw = (&self.s - sf) / n;
        symmetrize(&mut sb);
        symmetrize(&mut sw);
        (mu, sb, sw)
    }

    /// `Σ (x − mu)(x − mu)ᵀ` over all samples.
    pub fn centered_s(&self, mu: &DVector<f64>) -> DMatrix<f64> {
        let n = self.num_samples() as f64;
        let fm = &self.f_tot * mu.transpose();
        let mut out = &self.s - &fm - fm.transpose() + mu * mu.transpose() * n;
        symmetrize(&mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_by_class() {
        let x = DMatrix::from_row_slice(4, 2, &[1.0, 0.0, 3.0, 0.0, 0.0, 2.0, 0.0, 4.0]);
        let data = TrainData::new(&x, &[7, 7, 2, 2]).unwrap();
        assert_eq!(data.num_classes(), 2);
        assert_eq!(data.class_ids(), &[1, 1, 0, 0]);
        assert_eq!(data.counts(), &DVector::from_vec(vec![2.0, 2.0]));
        assert_eq!(data.class_sum(1), DVector::from_vec(vec![4.0, 0.0]));
        assert_eq!(data.f_tot(), &DVector::from_vec(vec![4.0, 6.0]));

        let (mu, sb, sw) = data.scatter();
        assert_eq!(mu, DVector::from_vec(vec![1.0, 1.5]));
        // class means (2, 0) and (0, 3)
        assert!((sb[(0, 0)] - 1.0).abs() < 1e-12);
        assert!((sb[(1, 1)] - 2.25).abs() < 1e-12);
        assert!((sb[(0, 1)] + 1.5).abs() < 1e-12);
        // each class has spread ±1 along its own axis
        assert!((sw[(0, 0)] - 0.5).abs() < 1e-12);
        assert!((sw[(1, 1)] - 0.5).abs() < 1e-12);
        assert!(sw[(0, 1)].abs() < 1e-12);
    }

    #[test]
    fn centered_second_moment() {
        let x = DMatrix::from_row_slice(3, 1, &[1.0, 2.0, 6.0]);
        let data = TrainData::new(&x, &[0, 0, 1]).unwrap();
        let c = data.centered_s(&DVector::from_vec(vec![3.0]));
        assert!((c[(0, 0)] - 14.0).abs() < 1e-12);
    }

    #[test]
    fn label_count_mismatch() {
        let x = DMatrix::zeros(3, 2);
        assert!(matches!(
            TrainData::new(&x, &[0, 1]),
            Err(PdfError::LabelCountMismatch { labels: 2, samples: 3 })
        ));
        let empty = DMatrix::zeros(0, 2);
        assert!(matches!(TrainData::new(&empty, &[]), Err(PdfError::Validation(_))));
    }
}
