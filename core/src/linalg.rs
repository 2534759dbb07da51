//! Linear algebra helpers for particle states and noise specifications.
//!
//! Public API:
//!     pub fn checked_add(lhs, rhs) -> DVector<f64>
//!     pub fn checked_component_mul(lhs, rhs) -> DVector<f64>
//!     pub fn dot(lhs, rhs) -> f64
//!     pub fn distance(lhs, rhs) -> f64
//!     pub fn diagonal_from_std(std_devs) -> DMatrix<f64>
//!     pub fn matrix_square_root(matrix) -> DMatrix<f64>
//!
//! Every vector helper asserts that both operands share a dimension.
//!
//! The square root pipeline used to sample correlated process noise:
//! 1) Symmetrize P ← 0.5 (P + Pᵀ)
//! 2) Cholesky
//! 3) Jittered Cholesky (geometric ramp)
//! 4) Symmetric EVD with eigenvalue floor → S = U * sqrt(Λ⁺) * Uᵀ

use nalgebra::linalg::{Cholesky, SymmetricEigen};
use nalgebra::{DMatrix, DVector};

/// Element-wise sum of two vectors of equal dimension.
pub fn checked_add(lhs: &DVector<f64>, rhs: &DVector<f64>) -> DVector<f64> {
    assert_eq!(
        lhs.len(),
        rhs.len(),
        "checked_add: dimension mismatch ({} vs {})",
        lhs.len(),
        rhs.len()
    );
    lhs + rhs
}

/// Element-wise (Hadamard) product of two vectors of equal dimension.
pub fn checked_component_mul(lhs: &DVector<f64>, rhs: &DVector<f64>) -> DVector<f64> {
    assert_eq!(
        lhs.len(),
        rhs.len(),
        "checked_component_mul: dimension mismatch ({} vs {})",
        lhs.len(),
        rhs.len()
    );
    lhs.component_mul(rhs)
}

/// Dot product of two vectors of equal dimension.
pub fn dot(lhs: &DVector<f64>, rhs: &DVector<f64>) -> f64 {
    assert_eq!(
        lhs.len(),
        rhs.len(),
        "dot: dimension mismatch ({} vs {})",
        lhs.len(),
        rhs.len()
    );
    lhs.dot(rhs)
}

/// Euclidean distance between two points of equal dimension.
///
/// For one-dimensional vectors this is the absolute difference of the two
/// scalars, which is what scalar measurement models (e.g. ranges) rely on.
pub fn distance(lhs: &DVector<f64>, rhs: &DVector<f64>) -> f64 {
    assert_eq!(
        lhs.len(),
        rhs.len(),
        "distance: dimension mismatch ({} vs {})",
        lhs.len(),
        rhs.len()
    );
    (lhs - rhs).norm()
}

/// Build a diagonal covariance matrix from per-dimension standard deviations.
///
/// # Arguments
/// * `std_devs` - standard deviation for each dimension
///
/// # Returns
/// A square matrix with `std_devs[i]²` on the diagonal.
pub fn diagonal_from_std(std_devs: &DVector<f64>) -> DMatrix<f64> {
    DMatrix::from_diagonal(&std_devs.map(|s| s * s))
}

/// Compute a robust square root `S` such that approximately `matrix ≈ S * Sᵀ`.
///
/// Attempts Cholesky decomposition first (yielding L such that matrix = L * L^T).
/// If Cholesky fails, a small diagonal jitter is ramped up; if that also fails the
/// symmetric eigen-decomposition is used with negative eigenvalues floored.
///
/// # Arguments
/// * `matrix` - The covariance to factor. Must be square.
///
/// # Returns
/// A matrix `S` with `matrix ≈ S * Sᵀ`. Lower triangular from Cholesky,
/// symmetric from the eigen fallback.
pub fn matrix_square_root(matrix: &DMatrix<f64>) -> DMatrix<f64> {
    assert!(
        matrix.is_square(),
        "matrix_square_root: matrix must be square"
    );
    const INITIAL_JITTER: f64 = 1e-12;
    const MAX_JITTER: f64 = 1e-6;
    const MAX_TRIES: usize = 6;
    const EIGEN_FLOOR: f64 = 0.0;
    let p = symmetrize(matrix);
    if let Some(s) = chol_sqrt(&p) {
        return s;
    }
    if let Some(s) = chol_sqrt_with_jitter(&p, INITIAL_JITTER, MAX_JITTER, MAX_TRIES) {
        return s;
    }
    evd_symmetric_sqrt_with_floor(&p, EIGEN_FLOOR)
}

/// Symmetrize a matrix: P ← 0.5 (P + Pᵀ)
#[inline]
pub fn symmetrize(m: &DMatrix<f64>) -> DMatrix<f64> {
    0.5 * (m + m.transpose())
}

fn chol_sqrt(p: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    Cholesky::new(p.clone()).map(|ch| ch.l().into_owned())
}

/// Cholesky with diagonal jitter on a geometric ramp. Returns None if all tries fail.
fn chol_sqrt_with_jitter(
    p: &DMatrix<f64>,
    initial_jitter: f64,
    max_jitter: f64,
    max_tries: usize,
) -> Option<DMatrix<f64>> {
    let n = p.nrows();
    let mut jitter = initial_jitter;
    for _ in 0..max_tries {
        let mut pj = p.clone();
        for i in 0..n {
            pj[(i, i)] += jitter;
        }
        if let Some(ch) = Cholesky::new(pj) {
            return Some(ch.l().into_owned());
        }
        jitter *= 10.0;
        if jitter > max_jitter {
            break;
        }
    }
    None
}

/// S = U * sqrt(max(λ, floor)) * Uᵀ
fn evd_symmetric_sqrt_with_floor(p: &DMatrix<f64>, floor: f64) -> DMatrix<f64> {
    let se = SymmetricEigen::new(p.clone());
    let lambdas = se.eigenvalues.map(|l| l.max(floor).sqrt());
    let u = se.eigenvectors;
    let sigma_half = DMatrix::<f64>::from_diagonal(&lambdas);
    &u * sigma_half * u.transpose()
}

/* =============================== Tests ==================================== */

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn approx_eq(a: &DMatrix<f64>, b: &DMatrix<f64>, tol: f64) -> bool {
        if a.shape() != b.shape() {
            return false;
        }
        a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() <= tol)
    }

    #[test]
    fn t_vector_helpers() {
        let a = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        let b = DVector::from_vec(vec![4.0, 5.0, 6.0]);
        assert_eq!(checked_add(&a, &b), DVector::from_vec(vec![5.0, 7.0, 9.0]));
        assert_eq!(
            checked_component_mul(&a, &b),
            DVector::from_vec(vec![4.0, 10.0, 18.0])
        );
        assert_approx_eq!(dot(&a, &b), 32.0, 1e-12);
        assert_approx_eq!(distance(&a, &b), 27.0_f64.sqrt(), 1e-12);
    }

    #[test]
    fn t_scalar_distance_is_absolute_difference() {
        let a = DVector::from_vec(vec![2.5]);
        let b = DVector::from_vec(vec![4.0]);
        assert_approx_eq!(distance(&a, &b), 1.5, 1e-12);
    }

    #[test]
    #[should_panic(expected = "checked_add: dimension mismatch")]
    fn t_checked_add_mismatch_panics() {
        let a = DVector::from_vec(vec![1.0, 2.0]);
        let b = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        let _ = checked_add(&a, &b);
    }

    #[test]
    #[should_panic(expected = "distance: dimension mismatch")]
    fn t_distance_mismatch_panics() {
        let a = DVector::from_vec(vec![1.0]);
        let b = DVector::from_vec(vec![1.0, 2.0]);
        let _ = distance(&a, &b);
    }

    #[test]
    fn t_diagonal_from_std() {
        let m = diagonal_from_std(&DVector::from_vec(vec![1.0, 2.0, 0.5]));
        assert_eq!(m.shape(), (3, 3));
        assert_approx_eq!(m[(0, 0)], 1.0, 1e-12);
        assert_approx_eq!(m[(1, 1)], 4.0, 1e-12);
        assert_approx_eq!(m[(2, 2)], 0.25, 1e-12);
        assert_approx_eq!(m[(0, 1)], 0.0, 1e-12);
    }

    #[test]
    fn t_symmetrize() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 0.0, 1.0]);
        let s = symmetrize(&m);
        assert_approx_eq!(s[(0, 1)], 1.0, 1e-12);
        assert_approx_eq!(s[(1, 0)], 1.0, 1e-12);
    }

    #[test]
    fn t_square_root_spd() {
        let p = DMatrix::from_row_slice(2, 2, &[4.0, 2.0, 2.0, 3.0]);
        let s = matrix_square_root(&p);
        assert!(approx_eq(&(&s * s.transpose()), &p, 1e-9));
    }

    #[test]
    fn t_square_root_semi_definite() {
        // Rank-deficient covariance: Cholesky fails, jitter or EVD must recover.
        let p = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        let s = matrix_square_root(&p);
        assert!(approx_eq(&(&s * s.transpose()), &p, 1e-5));
    }

    #[test]
    fn t_square_root_zero_matrix() {
        let p = DMatrix::<f64>::zeros(3, 3);
        let s = matrix_square_root(&p);
        assert!(approx_eq(&(&s * s.transpose()), &p, 1e-5));
    }

    #[test]
    fn t_evd_floor_negative_eigenvalues() {
        let p = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, -1.0]);
        let s = evd_symmetric_sqrt_with_floor(&p, 0.0);
        let r = &s * s.transpose();
        assert_approx_eq!(r[(0, 0)], 1.0, 1e-9);
        assert_approx_eq!(r[(1, 1)], 0.0, 1e-9);
    }

    #[test]
    #[should_panic(expected = "matrix must be square")]
    fn t_square_root_non_square_panics() {
        let p = DMatrix::<f64>::zeros(2, 3);
        let _ = matrix_square_root(&p);
    }
}
