//! Fock engine: Gaussian→Fock conversion, partial traces and contractions
//!
//! Fock tensors are `ndarray` arrays of complex amplitudes. A ket over `N`
//! modes has rank `N` (one axis per mode); a density matrix has rank `2N`
//! with all ket axes first and all conjugate axes after them, so axis `i`
//! and axis `i + N` belong to the same mode.

use crate::gaussian::{self, complement, validate_indices};
use nalgebra::{DMatrix, DVector};
use ndarray::{Array2, Array4, ArrayD, IxDyn, ShapeError, Slice};
use num_complex::Complex64;
use simcv_backend::NumericBackend;
use simcv_core::{AutocutoffPolicy, CvError, Result};
use std::f64::consts::FRAC_1_SQRT_2;

const ZERO: Complex64 = Complex64::new(0.0, 0.0);
const ONE: Complex64 = Complex64::new(1.0, 0.0);

/// A ket or a density matrix in the truncated number basis
#[derive(Debug, Clone, PartialEq)]
pub enum FockTensor {
    /// State vector, one axis per mode
    Ket(ArrayD<Complex64>),
    /// Density matrix, ket axes then conjugate axes
    Dm(ArrayD<Complex64>),
}

impl FockTensor {
    /// Check rank and per-mode squareness
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Ket(ket) => {
                if ket.shape().iter().any(|&d| d == 0) {
                    return Err(CvError::InvalidState("ket has an empty axis".to_string()));
                }
            }
            Self::Dm(dm) => {
                let shape = dm.shape();
                if shape.len() % 2 != 0 {
                    return Err(CvError::InvalidState(format!(
                        "density matrix must have even rank, got {}",
                        shape.len()
                    )));
                }
                let n = shape.len() / 2;
                for i in 0..n {
                    if shape[i] != shape[i + n] || shape[i] == 0 {
                        return Err(CvError::InvalidState(format!(
                            "density matrix axes {} and {} differ: {} vs {}",
                            i,
                            i + n,
                            shape[i],
                            shape[i + n]
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    #[inline]
    pub fn is_ket(&self) -> bool {
        matches!(self, Self::Ket(_))
    }

    #[inline]
    pub fn array(&self) -> &ArrayD<Complex64> {
        match self {
            Self::Ket(t) | Self::Dm(t) => t,
        }
    }

    pub fn num_modes(&self) -> usize {
        match self {
            Self::Ket(ket) => ket.ndim(),
            Self::Dm(dm) => dm.ndim() / 2,
        }
    }

    /// Per-mode truncation dimensions
    pub fn cutoffs(&self) -> Vec<usize> {
        let n = self.num_modes();
        self.array().shape()[..n].to_vec()
    }

    /// Density matrix view of this tensor (outer product for kets)
    pub fn to_dm(&self) -> ArrayD<Complex64> {
        match self {
            Self::Ket(ket) => ket_to_dm(ket),
            Self::Dm(dm) => dm.clone(),
        }
    }
}

/// Result of contracting two Fock tensors
#[derive(Debug, Clone, PartialEq)]
pub enum Contracted {
    /// Some modes remain
    Tensor(FockTensor),
    /// Every mode was contracted: `⟨φ|ψ⟩` for two kets, `Tr(σρ)` otherwise
    Scalar(Complex64),
}

fn shape_error(err: ShapeError) -> CvError {
    CvError::InvalidState(format!("tensor reshape failed: {}", err))
}

fn product(cutoffs: &[usize], modes: &[usize]) -> usize {
    modes.iter().map(|&m| cutoffs[m]).product()
}

/// Permute `tensor` to `order` and flatten it into a `rows × cols` matrix
fn to_matrix(tensor: &ArrayD<Complex64>, order: &[usize], rows: usize, cols: usize) -> Result<Array2<Complex64>> {
    let data: Vec<Complex64> = tensor
        .view()
        .permuted_axes(IxDyn(order))
        .iter()
        .copied()
        .collect();
    Array2::from_shape_vec((rows, cols), data).map_err(shape_error)
}

fn to_array4(tensor: &ArrayD<Complex64>, order: &[usize], dims: (usize, usize, usize, usize)) -> Result<Array4<Complex64>> {
    let data: Vec<Complex64> = tensor
        .view()
        .permuted_axes(IxDyn(order))
        .iter()
        .copied()
        .collect();
    Array4::from_shape_vec(dims, data).map_err(shape_error)
}

fn from_flat(data: Vec<Complex64>, shape: &[usize]) -> Result<ArrayD<Complex64>> {
    ArrayD::from_shape_vec(IxDyn(shape), data).map_err(shape_error)
}

fn doubled(cutoffs: &[usize]) -> Vec<usize> {
    cutoffs.iter().chain(cutoffs.iter()).copied().collect()
}

fn to_complex(m: &DMatrix<f64>) -> DMatrix<Complex64> {
    m.map(|v| Complex64::new(v, 0.0))
}

/// Bargmann parameters `(A, b, c)` of a Gaussian density matrix
///
/// `A` and `b` are indexed `[z_1 … z_N, z̄_1 … z̄_N]`, so the Hermite tensor of
/// the triple is the density matrix in ket-then-bra axis order.
pub fn bargmann_triple(
    cov: &DMatrix<f64>,
    means: &DVector<f64>,
    hbar: f64,
    backend: &dyn NumericBackend,
) -> Result<(DMatrix<Complex64>, DVector<Complex64>, Complex64)> {
    let n = gaussian::num_modes(cov)?;
    if means.len() != 2 * n {
        return Err(CvError::dimension_mismatch("means vector", 2 * n, means.len()));
    }
    let dim = 2 * n;

    let r = DMatrix::from_fn(dim, dim, |row, col| {
        if row % n != col % n {
            return ZERO;
        }
        match (row < n, col < n) {
            (_, true) => Complex64::new(FRAC_1_SQRT_2, 0.0),
            (true, false) => Complex64::new(0.0, FRAC_1_SQRT_2),
            (false, false) => Complex64::new(0.0, -FRAC_1_SQRT_2),
        }
    });

    let sigma = &r * to_complex(cov) * r.adjoint() * Complex64::from(1.0 / hbar);
    let q = sigma + DMatrix::<Complex64>::identity(dim, dim) * Complex64::from(0.5);
    let beta = &r * means.map(|v| Complex64::new(v, 0.0)) * Complex64::from(1.0 / hbar.sqrt());

    let det_q = backend.det_complex(&q);
    if !(det_q.re.is_finite() && det_q.im.is_finite()) || det_q.norm() == 0.0 {
        return Err(CvError::numerical("Gaussian→Fock: Q matrix is singular"));
    }
    let q_inv = backend.inv_complex(&q)?;

    let swap = DMatrix::from_fn(dim, dim, |i, j| if j == (i + n) % dim { ONE } else { ZERO });
    let a = (DMatrix::<Complex64>::identity(dim, dim) - &q_inv) * swap;
    let b = &q_inv * &beta;
    let quad = (beta.adjoint() * &b)[(0, 0)];
    let c = (quad * -0.5).exp() / det_q.sqrt();

    Ok((a, b, c))
}

/// Fock representation of a Gaussian state at the given cutoffs
///
/// Pure states give a ket (global phase fixed by `sqrt(c)`), mixed states a
/// density matrix.
pub fn fock_representation(
    cov: &DMatrix<f64>,
    means: &DVector<f64>,
    cutoffs: &[usize],
    pure: bool,
    hbar: f64,
    backend: &dyn NumericBackend,
) -> Result<FockTensor> {
    let n = gaussian::num_modes(cov)?;
    if cutoffs.len() != n {
        return Err(CvError::dimension_mismatch("cutoffs", n, cutoffs.len()));
    }
    let (a, b, c) = bargmann_triple(cov, means, hbar, backend)?;

    if pure {
        let a_ket = a.view((0, 0), (n, n)).into_owned();
        let b_ket = b.rows(0, n).into_owned();
        let ket = backend.hermite_renormalized(&a_ket, &b_ket, c.sqrt(), cutoffs)?;
        Ok(FockTensor::Ket(ket))
    } else {
        let dm = backend.hermite_renormalized(&a, &b, c, &doubled(cutoffs))?;
        Ok(FockTensor::Dm(dm))
    }
}

/// Per-mode cutoffs `ceil(mean + k·stdev) + 1` clipped to the policy bounds
///
/// The `+ 1` turns the largest photon number worth keeping into a
/// dimension, so photon number `ceil(mean + k·stdev)` itself is retained.
pub fn autocutoffs(number_stdev: &DVector<f64>, number_means: &DVector<f64>, policy: &AutocutoffPolicy) -> Vec<usize> {
    number_means
        .iter()
        .zip(number_stdev.iter())
        .map(|(&mean, &stdev)| {
            let raw = (mean + policy.stdev_factor * stdev).ceil();
            if raw.is_finite() {
                (raw.max(0.0) as usize + 1).clamp(policy.min_cutoff, policy.max_cutoff)
            } else {
                policy.max_cutoff
            }
        })
        .collect()
}

/// `|ψ⟩⟨ψ|` with ket axes first
pub fn ket_to_dm(ket: &ArrayD<Complex64>) -> ArrayD<Complex64> {
    let flat: Vec<Complex64> = ket.iter().copied().collect();
    let mut data = Vec::with_capacity(flat.len() * flat.len());
    for &left in &flat {
        data.extend(flat.iter().map(|right| left * right.conj()));
    }
    let shape = doubled(ket.shape());
    // The shape always matches the data length
    ArrayD::from_shape_vec(IxDyn(&shape), data).unwrap_or_else(|_| ArrayD::zeros(IxDyn(&shape)))
}

/// Recover a ket from a pure density matrix
///
/// Takes the dominant eigenvector scaled by the square root of its
/// eigenvalue; the global phase makes the largest component real positive.
pub fn dm_to_ket(dm: &ArrayD<Complex64>, backend: &dyn NumericBackend) -> Result<ArrayD<Complex64>> {
    FockTensor::Dm(dm.clone()).validate()?;
    let n = dm.ndim() / 2;
    let cutoffs = dm.shape()[..n].to_vec();
    let dim: usize = cutoffs.iter().product();

    let flat: Vec<Complex64> = dm.iter().copied().collect();
    let matrix = DMatrix::from_row_slice(dim, dim, &flat);
    let hermitian = (&matrix + matrix.adjoint()) * Complex64::from(0.5);
    let (values, vectors) = backend.eigh(&hermitian)?;

    let top = dim - 1;
    let weight = values[top].max(0.0).sqrt();
    let column = vectors.column(top);

    let (mut best, mut best_norm) = (0, 0.0);
    for (k, z) in column.iter().enumerate() {
        if z.norm() > best_norm {
            best = k;
            best_norm = z.norm();
        }
    }
    let phase = if best_norm > 0.0 {
        column[best].conj() / best_norm
    } else {
        ONE
    };

    let data = column.iter().map(|z| z * phase * weight).collect();
    from_flat(data, &cutoffs)
}

/// Photon-number probabilities of a ket
pub fn ket_to_probs(ket: &ArrayD<Complex64>) -> ArrayD<f64> {
    ket.mapv(|z| z.norm_sqr())
}

/// Photon-number probabilities of a density matrix (real part of the diagonal)
pub fn dm_to_probs(dm: &ArrayD<Complex64>) -> Result<ArrayD<f64>> {
    let tensor = FockTensor::Dm(dm.clone());
    tensor.validate()?;
    let cutoffs = tensor.cutoffs();
    let dim: usize = cutoffs.iter().product();
    let flat: Vec<Complex64> = dm.iter().copied().collect();
    let diag: Vec<f64> = (0..dim).map(|k| flat[k * dim + k].re).collect();
    ArrayD::from_shape_vec(IxDyn(&cutoffs), diag).map_err(shape_error)
}

/// Partial trace keeping the modes at `keep`, in that order
pub fn trace(dm: &ArrayD<Complex64>, keep: &[usize]) -> Result<ArrayD<Complex64>> {
    let tensor = FockTensor::Dm(dm.clone());
    tensor.validate()?;
    let n = tensor.num_modes();
    validate_indices(keep, n)?;
    let cutoffs = tensor.cutoffs();
    let traced = complement(keep, n);

    let order: Vec<usize> = keep
        .iter()
        .chain(traced.iter())
        .copied()
        .chain(keep.iter().chain(traced.iter()).map(|&m| m + n))
        .collect();
    let dk = product(&cutoffs, keep);
    let dt = product(&cutoffs, &traced);
    let rho = to_array4(dm, &order, (dk, dt, dk, dt))?;

    let mut data = Vec::with_capacity(dk * dk);
    for i in 0..dk {
        for j in 0..dk {
            data.push((0..dt).map(|t| rho[[i, t, j, t]]).sum::<Complex64>());
        }
    }
    let kept_cutoffs: Vec<usize> = keep.iter().map(|&m| cutoffs[m]).collect();
    from_flat(data, &doubled(&kept_cutoffs))
}

/// Contract `b` against the modes of `a` at `indices`
///
/// `b`'s axes are matched with `a`'s modes in the order of `indices` and
/// must have the same cutoffs. Remaining modes of `a` keep ascending order.
/// With `normalize`, a resulting ket is divided by its 2-norm and a
/// resulting density matrix by its trace.
pub fn contract_states(a: &FockTensor, b: &FockTensor, indices: &[usize], normalize: bool) -> Result<Contracted> {
    a.validate()?;
    b.validate()?;
    let na = a.num_modes();
    validate_indices(indices, na)?;
    if b.num_modes() != indices.len() {
        return Err(CvError::dimension_mismatch("contracted modes", indices.len(), b.num_modes()));
    }
    let cutoffs = a.cutoffs();
    for (k, &idx) in indices.iter().enumerate() {
        let cb = b.cutoffs()[k];
        if cb != cutoffs[idx] {
            return Err(CvError::dimension_mismatch(format!("cutoff of mode {}", idx), cutoffs[idx], cb));
        }
    }

    let rest = complement(indices, na);
    let ds = product(&cutoffs, indices);
    let dr = product(&cutoffs, &rest);
    let rest_cutoffs: Vec<usize> = rest.iter().map(|&m| cutoffs[m]).collect();

    if let (FockTensor::Ket(psi), FockTensor::Ket(phi)) = (a, b) {
        let order: Vec<usize> = indices.iter().chain(rest.iter()).copied().collect();
        let matrix = to_matrix(psi, &order, ds, dr)?;
        let phi: Vec<Complex64> = phi.iter().map(|z| z.conj()).collect();
        let mut out: Vec<Complex64> = (0..dr)
            .map(|j| (0..ds).map(|s| phi[s] * matrix[[s, j]]).sum::<Complex64>())
            .collect();

        if rest.is_empty() {
            return Ok(Contracted::Scalar(out[0]));
        }
        if normalize {
            let norm = out.iter().map(|z| z.norm_sqr()).sum::<f64>().sqrt();
            if norm > 0.0 {
                out.iter_mut().for_each(|z| *z /= norm);
            }
        }
        return Ok(Contracted::Tensor(FockTensor::Ket(from_flat(out, &rest_cutoffs)?)));
    }

    let rho = a.to_dm();
    let sigma = b.to_dm();
    let order: Vec<usize> = indices
        .iter()
        .chain(rest.iter())
        .copied()
        .chain(indices.iter().chain(rest.iter()).map(|&m| m + na))
        .collect();
    let rho = to_array4(&rho, &order, (ds, dr, ds, dr))?;
    let sigma_order: Vec<usize> = (0..2 * indices.len()).collect();
    let sigma = to_matrix(&sigma, &sigma_order, ds, ds)?;

    let mut out = vec![ZERO; dr * dr];
    for i in 0..dr {
        for j in 0..dr {
            let mut acc = ZERO;
            for s in 0..ds {
                for t in 0..ds {
                    acc += sigma[[s, t]] * rho[[t, i, s, j]];
                }
            }
            out[i * dr + j] = acc;
        }
    }

    if rest.is_empty() {
        return Ok(Contracted::Scalar(out[0]));
    }
    if normalize {
        let tr: Complex64 = (0..dr).map(|k| out[k * dr + k]).sum();
        if tr.norm() > 0.0 {
            out.iter_mut().for_each(|z| *z /= tr);
        }
    }
    Ok(Contracted::Tensor(FockTensor::Dm(from_flat(out, &doubled(&rest_cutoffs))?)))
}

/// Zero-pad or truncate each mode's axis (both axes for a density matrix)
pub fn pad_or_slice(tensor: &ArrayD<Complex64>, cutoffs: &[usize], is_dm: bool) -> Result<ArrayD<Complex64>> {
    let modes = if is_dm { tensor.ndim() / 2 } else { tensor.ndim() };
    if cutoffs.len() != modes || (is_dm && tensor.ndim() % 2 != 0) {
        return Err(CvError::dimension_mismatch("cutoffs", modes, cutoffs.len()));
    }
    let target = if is_dm { doubled(cutoffs) } else { cutoffs.to_vec() };
    if tensor.shape() == target.as_slice() {
        return Ok(tensor.clone());
    }

    let common: Vec<usize> = tensor
        .shape()
        .iter()
        .zip(&target)
        .map(|(&have, &want)| have.min(want))
        .collect();
    let mut out = ArrayD::zeros(IxDyn(&target));
    out.slice_each_axis_mut(|ax| Slice::from(0..common[ax.axis.index()]))
        .assign(&tensor.slice_each_axis(|ax| Slice::from(0..common[ax.axis.index()])));
    Ok(out)
}

/// Outer product with `a`'s axes first
fn outer(a: &ArrayD<Complex64>, b: &ArrayD<Complex64>) -> Result<ArrayD<Complex64>> {
    let right: Vec<Complex64> = b.iter().copied().collect();
    let mut data = Vec::with_capacity(a.len() * right.len());
    for &left in a.iter() {
        data.extend(right.iter().map(|r| left * r));
    }
    let shape: Vec<usize> = a.shape().iter().chain(b.shape()).copied().collect();
    from_flat(data, &shape)
}

/// Tensor product of two independent Fock states
///
/// Two kets give a ket; otherwise both are taken as density matrices and the
/// result is ordered `[a kets, b kets, a bras, b bras]`.
pub fn tensor_product(a: &FockTensor, b: &FockTensor) -> Result<FockTensor> {
    if let (FockTensor::Ket(left), FockTensor::Ket(right)) = (a, b) {
        return Ok(FockTensor::Ket(outer(left, right)?));
    }
    let (na, nb) = (a.num_modes(), b.num_modes());
    let joined = outer(&a.to_dm(), &b.to_dm())?;
    let order: Vec<usize> = (0..na)
        .chain(2 * na..2 * na + nb)
        .chain(na..2 * na)
        .chain(2 * na + nb..2 * na + 2 * nb)
        .collect();
    let dm = joined.permuted_axes(IxDyn(&order)).as_standard_layout().into_owned();
    Ok(FockTensor::Dm(dm))
}

/// `Σ|ψ|²` for a ket, `Re Tr ρ` for a density matrix
pub fn norm(tensor: &FockTensor) -> f64 {
    match tensor {
        FockTensor::Ket(ket) => ket.iter().map(|z| z.norm_sqr()).sum(),
        FockTensor::Dm(dm) => {
            let dim: usize = tensor.cutoffs().iter().product();
            dm.iter().step_by(dim + 1).map(|z| z.re).sum()
        }
    }
}

/// Purity `Tr(ρ²)/Tr(ρ)²`; kets are pure
pub fn purity(tensor: &FockTensor) -> Result<f64> {
    let dm = match tensor {
        FockTensor::Ket(_) => return Ok(1.0),
        FockTensor::Dm(dm) => dm,
    };
    tensor.validate()?;
    let dim: usize = tensor.cutoffs().iter().product();
    let flat: Vec<Complex64> = dm.iter().copied().collect();

    let tr: Complex64 = (0..dim).map(|k| flat[k * dim + k]).sum();
    if tr.norm() == 0.0 {
        return Err(CvError::numerical("purity of a zero density matrix"));
    }
    let mut tr2 = ZERO;
    for i in 0..dim {
        for j in 0..dim {
            tr2 += flat[i * dim + j] * flat[j * dim + i];
        }
    }
    Ok((tr2 / (tr * tr)).re)
}

fn probabilities(tensor: &FockTensor) -> Result<ArrayD<f64>> {
    match tensor {
        FockTensor::Ket(ket) => Ok(ket_to_probs(ket)),
        FockTensor::Dm(dm) => dm_to_probs(dm),
    }
}

/// Per-mode photon-number means and variances of the normalized state
pub fn number_moments(tensor: &FockTensor) -> Result<(DVector<f64>, DVector<f64>)> {
    let probs = probabilities(tensor)?;
    let n = tensor.num_modes();
    let total: f64 = probs.sum();
    if total.is_nan() || total <= 0.0 {
        return Err(CvError::numerical("photon-number moments of a zero state"));
    }

    let mut first = DVector::<f64>::zeros(n);
    let mut second = DVector::<f64>::zeros(n);
    for (index, &p) in probs.indexed_iter() {
        for mode in 0..n {
            let k = index[mode] as f64;
            first[mode] += k * p;
            second[mode] += k * k * p;
        }
    }
    let means = first / total;
    let variances = DVector::from_fn(n, |i, _| (second[i] / total - means[i] * means[i]).max(0.0));
    Ok((means, variances))
}
