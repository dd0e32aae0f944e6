//! Thin ndarray/faer bridge for the factorizations the sampler performs.
//!
//! Every matrix this engine inverts is small (K x K, prior or posterior
//! precision) and symmetric positive definite when the model is usable, so
//! a single LLT entry point is enough: inversion is factor-then-solve
//! against the identity, and the lower Cholesky factor doubles as the
//! transform for correlated Gaussian draws.

use faer::linalg::solvers::{self, Llt, Solve};
use faer::{Mat, MatRef, Side};
use ndarray::{Array2, ArrayBase, Data, Ix2};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinalgError {
    #[error("Cholesky factorization failed (matrix is singular or not positive definite): {0:?}")]
    Cholesky(solvers::LltError),
}

fn array_to_mat<S: Data<Elem = f64>>(a: &ArrayBase<S, Ix2>) -> Mat<f64> {
    Mat::from_fn(a.nrows(), a.ncols(), |i, j| a[[i, j]])
}

fn mat_to_array(m: MatRef<'_, f64>) -> Array2<f64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

/// An LLT factorization of a symmetric positive definite matrix.
pub struct SpdFactor {
    factor: Llt<f64>,
}

impl SpdFactor {
    pub fn solve_mat(&self, rhs: &Array2<f64>) -> Array2<f64> {
        let solution = self.factor.solve(array_to_mat(rhs).as_ref());
        mat_to_array(solution.as_ref())
    }

    /// The lower Cholesky factor L with A = L L^T.
    ///
    /// Only entries on or below the diagonal are meaningful; callers must
    /// not read the strict upper triangle.
    pub fn lower_triangular(&self) -> Array2<f64> {
        mat_to_array(self.factor.L())
    }
}

pub trait SpdCholesky {
    fn spd_cholesky(&self) -> Result<SpdFactor, LinalgError>;
}

impl<S: Data<Elem = f64>> SpdCholesky for ArrayBase<S, Ix2> {
    fn spd_cholesky(&self) -> Result<SpdFactor, LinalgError> {
        let m = array_to_mat(self);
        let factor = Llt::new(m.as_ref(), Side::Lower).map_err(LinalgError::Cholesky)?;
        Ok(SpdFactor { factor })
    }
}

/// Invert a symmetric positive definite matrix via its LLT factorization.
pub fn spd_inverse<S: Data<Elem = f64>>(a: &ArrayBase<S, Ix2>) -> Result<Array2<f64>, LinalgError> {
    let factor = a.spd_cholesky()?;
    Ok(factor.solve_mat(&Array2::eye(a.nrows())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn spd_inverse_round_trips() {
        let a = array![[4.0, 1.0, 0.5], [1.0, 3.0, 0.2], [0.5, 0.2, 2.0]];
        let a_inv = spd_inverse(&a).expect("SPD matrix must factor");
        let prod = a.dot(&a_inv);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_abs_diff_eq!(prod[[i, j]], expected, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn lower_factor_reconstructs_input() {
        let a = array![[2.0, 0.6], [0.6, 1.5]];
        let l = a
            .spd_cholesky()
            .expect("SPD matrix must factor")
            .lower_triangular();
        // Reconstruct reading only the lower triangle.
        for i in 0..2 {
            for j in 0..2 {
                let mut acc = 0.0;
                for c in 0..=i.min(j) {
                    acc += l[[i, c]] * l[[j, c]];
                }
                assert_abs_diff_eq!(acc, a[[i, j]], epsilon = 1e-12);
            }
        }
        assert!(l[[0, 0]] > 0.0 && l[[1, 1]] > 0.0);
    }

    #[test]
    fn indefinite_matrix_is_rejected() {
        let a = array![[1.0, 2.0], [2.0, 1.0]];
        assert!(matches!(a.spd_cholesky(), Err(LinalgError::Cholesky(_))));
        let singular = array![[1.0, 1.0], [1.0, 1.0]];
        assert!(spd_inverse(&singular).is_err());
    }
}
