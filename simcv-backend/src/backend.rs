//! Numeric backend contract consumed by the Gaussian and Fock engines

use nalgebra::{DMatrix, DVector};
use ndarray::ArrayD;
use num_complex::Complex64;
use simcv_core::Result;
use std::fmt;

/// Cotangents of the renormalized Hermite primitive with respect to its inputs
///
/// Each field holds `Σ_n cotangent[n] · ∂G[n]/∂θ` for the corresponding input
/// `θ`. Entries of `A` are treated as independent variables.
#[derive(Debug, Clone, PartialEq)]
pub struct HermiteGradient {
    pub a: DMatrix<Complex64>,
    pub b: DVector<Complex64>,
    pub c: Complex64,
}

/// Trait for numeric backends
///
/// Engines never reach for a global backend: a `&dyn NumericBackend` is
/// passed to every function that needs linear algebra or the Hermite
/// primitive, so backends can be swapped (or mocked) per call site.
///
/// # Example
///
/// ```
/// use simcv_backend::{NativeBackend, NumericBackend};
/// use nalgebra::DMatrix;
///
/// let backend = NativeBackend::default();
/// let m = DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 4.0]);
/// assert_eq!(backend.det(&m), 8.0);
/// ```
pub trait NumericBackend: Send + Sync + fmt::Debug {
    /// Backend name
    fn name(&self) -> &str;

    /// Inverse of a real square matrix
    ///
    /// Singular input is reported as `NumericalFailure`.
    fn inv(&self, matrix: &DMatrix<f64>) -> Result<DMatrix<f64>>;

    /// Determinant of a real square matrix
    fn det(&self, matrix: &DMatrix<f64>) -> f64;

    /// Inverse of a complex square matrix
    fn inv_complex(&self, matrix: &DMatrix<Complex64>) -> Result<DMatrix<Complex64>>;

    /// Determinant of a complex square matrix
    fn det_complex(&self, matrix: &DMatrix<Complex64>) -> Complex64;

    /// Matrix exponential of a real square matrix
    fn expm(&self, matrix: &DMatrix<f64>) -> DMatrix<f64>;

    /// Eigendecomposition of a Hermitian matrix
    ///
    /// Returns eigenvalues in ascending order and the matching eigenvectors
    /// as columns.
    fn eigh(&self, matrix: &DMatrix<Complex64>) -> Result<(DVector<f64>, DMatrix<Complex64>)>;

    /// Renormalized multidimensional Hermite tensor
    ///
    /// Coefficients `G[n] = ∂ⁿF(0) / sqrt(n!)` of
    /// `F(z) = c · exp(½ zᵀ A z + bᵀ z)`, truncated to `shape`.
    fn hermite_renormalized(
        &self,
        a: &DMatrix<Complex64>,
        b: &DVector<Complex64>,
        c: Complex64,
        shape: &[usize],
    ) -> Result<ArrayD<Complex64>>;

    /// Gradient rule of [`NumericBackend::hermite_renormalized`]
    ///
    /// `output` is the tensor previously returned for `(a, b, c)` and
    /// `cotangent` has the same shape.
    fn hermite_renormalized_vjp(
        &self,
        a: &DMatrix<Complex64>,
        b: &DVector<Complex64>,
        c: Complex64,
        output: &ArrayD<Complex64>,
        cotangent: &ArrayD<Complex64>,
    ) -> Result<HermiteGradient>;
}
