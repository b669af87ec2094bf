//! Physicality checks for user-supplied Gaussian data
//!
//! States derived by the engines are trusted; these checks run when a
//! covariance matrix or a matrix-valued parameter enters from outside.

use crate::gaussian;
use nalgebra::DMatrix;
use num_complex::Complex64;
use simcv_backend::NumericBackend;
use simcv_core::{CvError, Result};

/// Symplectic form `Ω = [[0, I], [−I, 0]]` in xxpp ordering
pub fn symplectic_form(modes: usize) -> DMatrix<f64> {
    DMatrix::from_fn(2 * modes, 2 * modes, |r, c| {
        if c == r + modes {
            1.0
        } else if r == c + modes {
            -1.0
        } else {
            0.0
        }
    })
}

/// Largest absolute entry of `a - b`
fn max_deviation(a: &DMatrix<f64>, b: &DMatrix<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).fold(0.0, f64::max)
}

pub fn is_symmetric(matrix: &DMatrix<f64>, tolerance: f64) -> bool {
    matrix.is_square() && max_deviation(matrix, &matrix.transpose()) <= tolerance
}

/// `S Ω Sᵀ = Ω` within tolerance
pub fn is_symplectic(matrix: &DMatrix<f64>, tolerance: f64) -> bool {
    if !matrix.is_square() || matrix.nrows() % 2 != 0 {
        return false;
    }
    let omega = symplectic_form(matrix.nrows() / 2);
    max_deviation(&(matrix * &omega * matrix.transpose()), &omega) <= tolerance
}

/// `O Oᵀ = I` within tolerance
pub fn is_orthogonal(matrix: &DMatrix<f64>, tolerance: f64) -> bool {
    if !matrix.is_square() {
        return false;
    }
    let n = matrix.nrows();
    max_deviation(&(matrix * matrix.transpose()), &DMatrix::identity(n, n)) <= tolerance
}

/// Check that `cov` is a valid quantum covariance matrix
///
/// Requires symmetry and the uncertainty relation `V + i·hbar/2·Ω ⪰ 0`,
/// tested through the smallest eigenvalue of that Hermitian matrix.
pub fn check_covariance(
    cov: &DMatrix<f64>,
    hbar: f64,
    tolerance: f64,
    backend: &dyn NumericBackend,
) -> Result<()> {
    let modes = gaussian::num_modes(cov)?;
    if cov.iter().any(|v| !v.is_finite()) {
        return Err(CvError::InvalidState("covariance has non-finite entries".to_string()));
    }
    let scale = cov.iter().fold(1.0f64, |m, v| m.max(v.abs()));
    if !is_symmetric(cov, tolerance * scale) {
        return Err(CvError::InvalidState("covariance is not symmetric".to_string()));
    }

    let omega = symplectic_form(modes);
    let uncertainty = DMatrix::from_fn(2 * modes, 2 * modes, |r, c| {
        Complex64::new(cov[(r, c)], hbar / 2.0 * omega[(r, c)])
    });
    let (eigenvalues, _) = backend.eigh(&uncertainty)?;
    if let Some(&smallest) = eigenvalues.iter().next() {
        if smallest < -tolerance * scale {
            return Err(CvError::InvalidState(format!(
                "covariance violates the uncertainty principle (eigenvalue {:.3e})",
                smallest
            )));
        }
    }
    Ok(())
}
