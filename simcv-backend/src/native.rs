//! Native CPU backend built on nalgebra, ndarray and rayon

use crate::backend::{HermiteGradient, NumericBackend};
use crate::hermite;
use nalgebra::{DMatrix, DVector, SymmetricEigen};
use ndarray::ArrayD;
use num_complex::Complex64;
use simcv_core::{CvError, Result};

/// Default grid size above which gradient reductions run in parallel
const DEFAULT_PARALLEL_THRESHOLD: usize = 1 << 14;

/// CPU backend
///
/// Linear algebra goes through nalgebra; the Hermite gradient reduction is
/// spread over the rayon pool once the grid exceeds `parallel_threshold`
/// entries. Forward evaluation is sequential (the recurrence is ordered).
#[derive(Debug, Clone)]
pub struct NativeBackend {
    parallel_threshold: usize,
}

impl Default for NativeBackend {
    fn default() -> Self {
        Self {
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
        }
    }
}

impl NativeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the grid size above which reductions run in parallel
    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    #[inline]
    pub fn parallel_threshold(&self) -> usize {
        self.parallel_threshold
    }
}

fn ensure_square(rows: usize, cols: usize, op: &str) -> Result<()> {
    if rows != cols {
        return Err(CvError::dimension_mismatch(op, rows, cols));
    }
    Ok(())
}

impl NumericBackend for NativeBackend {
    fn name(&self) -> &str {
        "native"
    }

    fn inv(&self, matrix: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        ensure_square(matrix.nrows(), matrix.ncols(), "matrix inverse")?;
        matrix
            .clone()
            .try_inverse()
            .filter(|inv| inv.iter().all(|x| x.is_finite()))
            .ok_or_else(|| {
                CvError::numerical(format!(
                    "{}x{} matrix is singular",
                    matrix.nrows(),
                    matrix.ncols()
                ))
            })
    }

    fn det(&self, matrix: &DMatrix<f64>) -> f64 {
        if !matrix.is_square() {
            return f64::NAN;
        }
        matrix.determinant()
    }

    fn inv_complex(&self, matrix: &DMatrix<Complex64>) -> Result<DMatrix<Complex64>> {
        ensure_square(matrix.nrows(), matrix.ncols(), "complex matrix inverse")?;
        matrix
            .clone()
            .try_inverse()
            .filter(|inv| inv.iter().all(|x| x.re.is_finite() && x.im.is_finite()))
            .ok_or_else(|| {
                CvError::numerical(format!(
                    "{}x{} complex matrix is singular",
                    matrix.nrows(),
                    matrix.ncols()
                ))
            })
    }

    fn det_complex(&self, matrix: &DMatrix<Complex64>) -> Complex64 {
        if !matrix.is_square() {
            return Complex64::new(f64::NAN, f64::NAN);
        }
        matrix.determinant()
    }

    fn expm(&self, matrix: &DMatrix<f64>) -> DMatrix<f64> {
        matrix.exp()
    }

    fn eigh(&self, matrix: &DMatrix<Complex64>) -> Result<(DVector<f64>, DMatrix<Complex64>)> {
        ensure_square(matrix.nrows(), matrix.ncols(), "hermitian eigendecomposition")?;
        let n = matrix.nrows();
        let eig = SymmetricEigen::try_new(matrix.clone(), f64::EPSILON, 0)
            .ok_or_else(|| CvError::numerical("hermitian eigendecomposition did not converge"))?;

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&i, &j| eig.eigenvalues[i].total_cmp(&eig.eigenvalues[j]));

        let values = DVector::from_iterator(n, order.iter().map(|&i| eig.eigenvalues[i]));
        let vectors = DMatrix::from_fn(n, n, |r, c| eig.eigenvectors[(r, order[c])]);
        Ok((values, vectors))
    }

    fn hermite_renormalized(
        &self,
        a: &DMatrix<Complex64>,
        b: &DVector<Complex64>,
        c: Complex64,
        shape: &[usize],
    ) -> Result<ArrayD<Complex64>> {
        hermite::renormalized(a, b, c, shape)
    }

    fn hermite_renormalized_vjp(
        &self,
        a: &DMatrix<Complex64>,
        b: &DVector<Complex64>,
        c: Complex64,
        output: &ArrayD<Complex64>,
        cotangent: &ArrayD<Complex64>,
    ) -> Result<HermiteGradient> {
        let parallel = output.len() >= self.parallel_threshold;
        hermite::renormalized_vjp(a, b, c, output, cotangent, parallel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_inverse_and_determinant() {
        let backend = NativeBackend::new();
        let m = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 2.0, 3.0]);
        assert_relative_eq!(backend.det(&m), 10.0, epsilon = 1e-12);

        let inv = backend.inv(&m).unwrap();
        assert_relative_eq!(&m * inv, DMatrix::identity(2, 2), epsilon = 1e-12);
    }

    #[test]
    fn test_singular_matrix_is_numerical_failure() {
        let backend = NativeBackend::new();
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        assert!(matches!(backend.inv(&m), Err(CvError::NumericalFailure(_))));

        let c = DMatrix::from_element(2, 2, Complex64::new(1.0, 1.0));
        assert!(matches!(backend.inv_complex(&c), Err(CvError::NumericalFailure(_))));
    }

    #[test]
    fn test_non_square_inverse_rejected() {
        let backend = NativeBackend::new();
        let m = DMatrix::<f64>::zeros(2, 3);
        assert!(matches!(backend.inv(&m), Err(CvError::DimensionMismatch { .. })));
        assert!(backend.det(&m).is_nan());
    }

    #[test]
    fn test_expm_of_rotation_generator() {
        let backend = NativeBackend::new();
        let theta = 0.7f64;
        let generator = DMatrix::from_row_slice(2, 2, &[0.0, -theta, theta, 0.0]);
        let rotation = backend.expm(&generator);
        let expected =
            DMatrix::from_row_slice(2, 2, &[theta.cos(), -theta.sin(), theta.sin(), theta.cos()]);
        assert_relative_eq!(rotation, expected, epsilon = 1e-10);
    }

    #[test]
    fn test_expm_of_zero_and_diagonal() {
        let backend = NativeBackend::new();
        let zero = DMatrix::<f64>::zeros(3, 3);
        assert_relative_eq!(backend.expm(&zero), DMatrix::identity(3, 3), epsilon = 1e-12);

        let diagonal = DMatrix::from_diagonal(&DVector::from_vec(vec![1.0, 2.0, -0.5]));
        let expected = DMatrix::from_diagonal(&DVector::from_vec(vec![
            1.0f64.exp(),
            2.0f64.exp(),
            (-0.5f64).exp(),
        ]));
        assert_relative_eq!(backend.expm(&diagonal), expected, epsilon = 1e-9);
    }

    #[test]
    fn test_eigh_sorted_ascending() {
        let backend = NativeBackend::new();
        let m = DMatrix::from_row_slice(
            2,
            2,
            &[
                Complex64::new(2.0, 0.0),
                Complex64::new(0.0, 1.0),
                Complex64::new(0.0, -1.0),
                Complex64::new(2.0, 0.0),
            ],
        );
        let (values, vectors) = backend.eigh(&m).unwrap();
        assert_relative_eq!(values[0], 1.0, epsilon = 1e-10);
        assert_relative_eq!(values[1], 3.0, epsilon = 1e-10);

        // M v = λ v for the top eigenvector
        let v = vectors.column(1).into_owned();
        let mv = &m * &v;
        for k in 0..2 {
            assert!((mv[k] - v[k] * 3.0).norm() < 1e-10);
        }
    }

    #[test]
    fn test_parallel_threshold_builder() {
        let backend = NativeBackend::new().with_parallel_threshold(16);
        assert_eq!(backend.parallel_threshold(), 16);
        assert_eq!(backend.name(), "native");
    }
}
