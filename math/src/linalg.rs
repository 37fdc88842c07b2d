use nalgebra::{DMatrix, DVector, SymmetricEigen};

use crate::MathError;

/// Natural logarithm of 2π.
pub const LOG_2PI: f64 = 1.837_877_066_409_345_3;

fn check_square(m: &DMatrix<f64>) -> Result<(), MathError> {
    if m.nrows() != m.ncols() {
        return Err(MathError::NotSquare {
            rows: m.nrows(),
            cols: m.ncols(),
        });
    }
    Ok(())
}

/// Replaces `m` by `(m + mᵀ) / 2`.
pub fn symmetrize(m: &mut DMatrix<f64>) {
    let s = (&*m + m.transpose()) * 0.5;
    *m = s;
}

/// Inverts a symmetric positive definite matrix through its Cholesky factor.
///
/// Returns the (symmetrized) inverse together with `log|m|`.
pub fn invert_pdmat(m: &DMatrix<f64>) -> Result<(DMatrix<f64>, f64), MathError> {
    check_square(m)?;
    let chol = m
        .clone()
        .cholesky()
        .ok_or(MathError::NotPositiveDefinite { dim: m.nrows() })?;
    let logdet = 2.0 * chol.l().diagonal().iter().map(|v| v.ln()).sum::<f64>();
    let mut inv = chol.inverse();
    symmetrize(&mut inv);
    Ok((inv, logdet))
}

/// Log-determinant of a symmetric positive definite matrix.
pub fn logdet_pdmat(m: &DMatrix<f64>) -> Result<f64, MathError> {
    check_square(m)?;
    let chol = m
        .clone()
        .cholesky()
        .ok_or(MathError::NotPositiveDefinite { dim: m.nrows() })?;
    Ok(2.0 * chol.l().diagonal().iter().map(|v| v.ln()).sum::<f64>())
}

/// Lower Cholesky factor `L` with `m = L Lᵀ`.
pub fn chol_lower(m: &DMatrix<f64>) -> Result<DMatrix<f64>, MathError> {
    check_square(m)?;
    let chol = m
        .clone()
        .cholesky()
        .ok_or(MathError::NotPositiveDefinite { dim: m.nrows() })?;
    Ok(chol.l())
}

/// Symmetric eigendecomposition with eigenvalues in descending order.
///
/// Each eigenvector is signed so that its largest-magnitude entry is
/// positive, which keeps downstream projections reproducible.
pub fn sym_eig_desc(m: &DMatrix<f64>) -> Result<(DVector<f64>, DMatrix<f64>), MathError> {
    check_square(m)?;
    let mut sym = m.clone();
    symmetrize(&mut sym);
    let eig = SymmetricEigen::new(sym);
    let n = eig.eigenvalues.len();

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        eig.eigenvalues[b]
            .total_cmp(&eig.eigenvalues[a])
            .then(a.cmp(&b))
    });

    let values = DVector::from_iterator(n, order.iter().map(|&i| eig.eigenvalues[i]));
    let mut vectors = DMatrix::zeros(n, n);
    for (k, &i) in order.iter().enumerate() {
        let mut col = eig.eigenvectors.column(i).into_owned();
        let pivot = col
            .iter()
            .copied()
            .fold(0.0f64, |acc, v| if v.abs() > acc.abs() { v } else { acc });
        if pivot < 0.0 {
            col.neg_mut();
        }
        vectors.set_column(k, &col);
    }
    Ok((values, vectors))
}

/// Rebuilds a symmetric matrix with every eigenvalue clamped to at least `floor`.
pub fn floor_eigenvalues(m: &DMatrix<f64>, floor: f64) -> Result<DMatrix<f64>, MathError> {
    let (values, vectors) = sym_eig_desc(m)?;
    let clamped = values.map(|v| v.max(floor));
    let mut out = &vectors * DMatrix::from_diagonal(&clamped) * vectors.transpose();
    symmetrize(&mut out);
    Ok(out)
}

/// Factor `A` (`dim x k`) with `A Aᵀ` approximating the top-`k` eigen
/// subspace of the symmetric matrix `m`. Negative eigenvalues count as zero.
pub fn top_k_factor(m: &DMatrix<f64>, k: usize) -> Result<DMatrix<f64>, MathError> {
    let (values, vectors) = sym_eig_desc(m)?;
    if k > values.len() {
        return Err(MathError::DimensionMismatch {
            expected: values.len(),
            got: k,
        });
    }
    let mut a = vectors.columns(0, k).into_owned();
    for (j, mut col) in a.column_iter_mut().enumerate() {
        col *= values[j].max(0.0).sqrt();
    }
    Ok(a)
}

/// Generalized symmetric eigenproblem `A v = λ B v` with `B` positive definite.
///
/// Eigenvalues come back in descending order; eigenvectors are
/// `B`-orthonormal (`Vᵀ B V = I`).
pub fn gen_eig_desc(
    a: &DMatrix<f64>,
    b: &DMatrix<f64>,
) -> Result<(DVector<f64>, DMatrix<f64>), MathError> {
    check_square(a)?;
    check_square(b)?;
    if a.nrows() != b.nrows() {
        return Err(MathError::DimensionMismatch {
            expected: b.nrows(),
            got: a.nrows(),
        });
    }
    let l = chol_lower(b)?;
    let dim = b.nrows();

    let left = l.solve_lower_triangular(a).ok_or(MathError::NotPositiveDefinite { dim })?;
    let mut c = l
        .solve_lower_triangular(&left.transpose())
        .ok_or(MathError::NotPositiveDefinite { dim })?;
    symmetrize(&mut c);

    let (values, u) = sym_eig_desc(&c)?;
    let v = l
        .transpose()
        .solve_upper_triangular(&u)
        .ok_or(MathError::NotPositiveDefinite { dim })?;
    Ok((values, v))
}

/// Column mean of the rows of `x`.
pub fn mean_rows(x: &DMatrix<f64>) -> Result<DVector<f64>, MathError> {
    if x.nrows() == 0 {
        return Err(MathError::Empty);
    }
    let mut mu = DVector::zeros(x.ncols());
    for row in x.row_iter() {
        mu += row.transpose();
    }
    Ok(mu / x.nrows() as f64)
}

/// Returns `x` with `mu` subtracted from every row.
pub fn center_rows(x: &DMatrix<f64>, mu: &DVector<f64>) -> Result<DMatrix<f64>, MathError> {
    if x.ncols() != mu.len() {
        return Err(MathError::DimensionMismatch {
            expected: mu.len(),
            got: x.ncols(),
        });
    }
    let mu_t = mu.transpose();
    let mut out = x.clone();
    for mut row in out.row_iter_mut() {
        row -= &mu_t;
    }
    Ok(out)
}

/// Maximum-likelihood covariance of the rows of `x` around their mean.
pub fn covariance(x: &DMatrix<f64>) -> Result<(DVector<f64>, DMatrix<f64>), MathError> {
    let mu = mean_rows(x)?;
    let xc = center_rows(x, &mu)?;
    let mut c = xc.transpose() * &xc / x.nrows() as f64;
    symmetrize(&mut c);
    Ok((mu, c))
}

/// Scales every row of `x` to Euclidean norm `radius`. Zero rows stay zero.
pub fn length_normalize_rows(x: &mut DMatrix<f64>, radius: f64) {
    for mut row in x.row_iter_mut() {
        let norm = row.norm();
        if norm > 0.0 {
            row *= radius / norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spd3() -> DMatrix<f64> {
        DMatrix::from_row_slice(3, 3, &[4.0, 1.0, 0.5, 1.0, 3.0, 0.2, 0.5, 0.2, 2.0])
    }

    #[test]
    fn invert_pdmat_identity_product() {
        let m = spd3();
        let (inv, logdet) = invert_pdmat(&m).unwrap();
        let prod = &m * &inv;
        assert!((prod - DMatrix::identity(3, 3)).abs().max() < 1e-10);
        assert!((logdet - m.determinant().ln()).abs() < 1e-10);
    }

    #[test]
    fn invert_pdmat_rejects_indefinite() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);
        assert!(matches!(
            invert_pdmat(&m),
            Err(MathError::NotPositiveDefinite { dim: 2 })
        ));
    }

    #[test]
    fn sym_eig_desc_sorted_and_reconstructs() {
        let m = spd3();
        let (values, vectors) = sym_eig_desc(&m).unwrap();
        assert!(values[0] >= values[1] && values[1] >= values[2]);
        let rebuilt = &vectors * DMatrix::from_diagonal(&values) * vectors.transpose();
        assert!((rebuilt - m).abs().max() < 1e-10);
    }

    #[test]
    fn floor_eigenvalues_clamps() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 0.0]);
        let floored = floor_eigenvalues(&m, 0.1).unwrap();
        assert!((floored[(1, 1)] - 0.1).abs() < 1e-12);
        assert!((floored[(0, 0)] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn top_k_factor_recovers_rank_one() {
        let v = DVector::from_vec(vec![1.0, 2.0, 2.0]);
        let m = &v * v.transpose();
        let a = top_k_factor(&m, 1).unwrap();
        assert!((&a * a.transpose() - m).abs().max() < 1e-10);
        assert!(top_k_factor(&spd3(), 4).is_err());
    }

    #[test]
    fn gen_eig_b_orthonormal() {
        let a = DMatrix::from_row_slice(2, 2, &[2.0, 0.5, 0.5, 1.0]);
        let b = DMatrix::from_row_slice(2, 2, &[1.5, 0.2, 0.2, 0.8]);
        let (values, v) = gen_eig_desc(&a, &b).unwrap();
        let vbv = v.transpose() * &b * &v;
        assert!((vbv - DMatrix::identity(2, 2)).abs().max() < 1e-10);
        for j in 0..2 {
            let col = v.column(j);
            let lhs = &a * col;
            let rhs = &b * col * values[j];
            assert!((lhs - rhs).abs().max() < 1e-10);
        }
        assert!(values[0] >= values[1]);
    }

    #[test]
    fn covariance_of_known_rows() {
        let x = DMatrix::from_row_slice(4, 2, &[1.0, 0.0, -1.0, 0.0, 0.0, 2.0, 0.0, -2.0]);
        let (mu, c) = covariance(&x).unwrap();
        assert!(mu.abs().max() < 1e-12);
        assert!((c[(0, 0)] - 0.5).abs() < 1e-12);
        assert!((c[(1, 1)] - 2.0).abs() < 1e-12);
        assert!(c[(0, 1)].abs() < 1e-12);
    }

    #[test]
    fn length_normalize_rows_radius() {
        let mut x = DMatrix::from_row_slice(2, 2, &[3.0, 4.0, 0.0, 0.0]);
        length_normalize_rows(&mut x, 2.0);
        assert!((x.row(0).norm() - 2.0).abs() < 1e-12);
        assert_eq!(x.row(1).norm(), 0.0);
    }

    #[test]
    fn mean_rows_empty_is_error() {
        let x = DMatrix::<f64>::zeros(0, 3);
        assert!(matches!(mean_rows(&x), Err(MathError::Empty)));
    }
}
