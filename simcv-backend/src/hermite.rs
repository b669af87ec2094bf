//! Renormalized multidimensional Hermite recurrence
//!
//! Computes the coefficients `G[n] = ∂ⁿF(0) / sqrt(n!)` of
//! `F(z) = c · exp(½ zᵀ A z + bᵀ z)` on a truncated grid. Dividing by
//! `sqrt(n!)` instead of `n!` keeps the amplitudes bounded, which is what
//! makes these coefficients usable as Fock amplitudes directly.
//!
//! # Recurrence
//!
//! ```text
//! G[0]       = c
//! G[m + e_i] = (b_i G[m] + Σ_j A_ij sqrt(m_j) G[m - e_j]) / sqrt(m_i + 1)
//! ```
//!
//! Every term on the right-hand side has a smaller row-major flat index than
//! the left-hand side, so one pass over the grid in memory order suffices.

use crate::backend::HermiteGradient;
use nalgebra::{DMatrix, DVector};
use ndarray::{ArrayD, IxDyn};
use num_complex::Complex64;
use rayon::prelude::*;
use simcv_core::{CvError, Result};
use smallvec::{smallvec, SmallVec};

type Index = SmallVec<[usize; 8]>;

const ZERO: Complex64 = Complex64::new(0.0, 0.0);
const ONE: Complex64 = Complex64::new(1.0, 0.0);

fn validate(a: &DMatrix<Complex64>, b: &DVector<Complex64>, shape: &[usize]) -> Result<()> {
    let dims = shape.len();
    if a.nrows() != dims || a.ncols() != dims {
        return Err(CvError::dimension_mismatch("Hermite A matrix", dims, a.nrows()));
    }
    if b.len() != dims {
        return Err(CvError::dimension_mismatch("Hermite b vector", dims, b.len()));
    }
    if let Some(axis) = shape.iter().position(|&s| s == 0) {
        return Err(CvError::InvalidParameter(format!(
            "cutoff along axis {} must be at least 1",
            axis
        )));
    }
    Ok(())
}

/// Row-major strides of `shape`
fn strides(shape: &[usize]) -> Index {
    let mut strides: Index = smallvec![1; shape.len()];
    for axis in (0..shape.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * shape[axis + 1];
    }
    strides
}

fn sqrt_table(shape: &[usize]) -> Vec<f64> {
    let max = shape.iter().copied().max().unwrap_or(1);
    (0..max).map(|n| (n as f64).sqrt()).collect()
}

/// Advance a multi-index by one position in row-major order
#[inline]
fn advance(index: &mut Index, shape: &[usize]) {
    for axis in (0..shape.len()).rev() {
        index[axis] += 1;
        if index[axis] < shape[axis] {
            return;
        }
        index[axis] = 0;
    }
}

/// Evaluate the renormalized Hermite tensor of `(a, b, c)` with the given shape
pub fn renormalized(
    a: &DMatrix<Complex64>,
    b: &DVector<Complex64>,
    c: Complex64,
    shape: &[usize],
) -> Result<ArrayD<Complex64>> {
    validate(a, b, shape)?;

    let dims = shape.len();
    let total: usize = shape.iter().product();
    let strides = strides(shape);
    let sqrt = sqrt_table(shape);
    tracing::trace!(dims, total, "renormalized hermite recurrence");

    let mut g = vec![ZERO; total];
    g[0] = c;

    let mut index: Index = smallvec![0; dims];
    for flat in 1..total {
        advance(&mut index, shape);

        // Pivot on the first occupied axis
        let Some(i) = index.iter().position(|&n| n > 0) else {
            continue;
        };
        let prev = flat - strides[i];

        let mut value = b[i] * g[prev];
        for j in 0..dims {
            let m_j = if j == i { index[j] - 1 } else { index[j] };
            if m_j > 0 {
                value += a[(i, j)] * sqrt[m_j] * g[prev - strides[j]];
            }
        }
        g[flat] = value / sqrt[index[i]];
    }

    if g.iter().any(|x| !x.re.is_finite() || !x.im.is_finite()) {
        return Err(CvError::numerical(
            "renormalized Hermite recurrence produced non-finite amplitudes",
        ));
    }

    ArrayD::from_shape_vec(IxDyn(shape), g).map_err(|e| CvError::numerical(e.to_string()))
}

/// Vector-Jacobian product of [`renormalized`]
///
/// `output` must be the tensor returned by [`renormalized`] for the same
/// inputs. With `parallel` set, the reduction over grid points runs on the
/// rayon pool.
pub fn renormalized_vjp(
    a: &DMatrix<Complex64>,
    b: &DVector<Complex64>,
    c: Complex64,
    output: &ArrayD<Complex64>,
    cotangent: &ArrayD<Complex64>,
    parallel: bool,
) -> Result<HermiteGradient> {
    let shape = output.shape().to_vec();
    validate(a, b, &shape)?;
    if cotangent.shape() != shape.as_slice() {
        return Err(CvError::dimension_mismatch(
            "Hermite cotangent",
            output.len(),
            cotangent.len(),
        ));
    }

    let dims = shape.len();
    let total = output.len();
    let strides = strides(&shape);
    let sqrt = sqrt_table(&shape);

    let g: Vec<Complex64> = output.iter().copied().collect();
    let up: Vec<Complex64> = cotangent.iter().copied().collect();

    // G is linear in c
    let dg_dc: Vec<Complex64> = if c.norm() > 0.0 {
        g.iter().map(|x| x / c).collect()
    } else {
        renormalized(a, b, ONE, &shape)?.iter().copied().collect()
    };

    let zero_grad = || HermiteGradient {
        a: DMatrix::zeros(dims, dims),
        b: DVector::zeros(dims),
        c: ZERO,
    };

    let accumulate = |mut acc: HermiteGradient, flat: usize| -> HermiteGradient {
        let weight = up[flat];
        if weight == ZERO {
            return acc;
        }

        let mut rest = flat;
        let mut n: Index = smallvec![0; dims];
        for axis in 0..dims {
            n[axis] = rest / strides[axis];
            rest %= strides[axis];
        }

        acc.c += weight * dg_dc[flat];
        for i in 0..dims {
            if n[i] == 0 {
                continue;
            }
            let below = flat - strides[i];
            acc.b[i] += weight * sqrt[n[i]] * g[below];

            for j in 0..dims {
                let n_j = if j == i { n[j] - 1 } else { n[j] };
                if n_j > 0 {
                    acc.a[(i, j)] +=
                        weight * (0.5 * sqrt[n[i]] * sqrt[n_j]) * g[below - strides[j]];
                }
            }
        }
        acc
    };

    let merge = |mut x: HermiteGradient, y: HermiteGradient| {
        x.a += y.a;
        x.b += y.b;
        x.c += y.c;
        x
    };

    let grad = if parallel {
        (0..total)
            .into_par_iter()
            .fold(zero_grad, &accumulate)
            .reduce(zero_grad, merge)
    } else {
        (0..total).fold(zero_grad(), &accumulate)
    };

    Ok(grad)
}
