//! Standard state preparations
//!
//! Multi-mode preparations take one parameter per mode; all parameter
//! slices of a call must have the same length. Complex amplitudes are
//! written `α = x + i·y`, so a coherent state has means `sqrt(2·hbar)·(x, y)`.

use crate::context::Context;
use crate::state::State;
use nalgebra::{DMatrix, DVector};
use ndarray::{ArrayD, IxDyn};
use num_complex::Complex64;
use simcv_core::{CvError, Result};

fn check_lengths(name: &str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(CvError::dimension_mismatch(format!("{} parameters", name), expected, actual));
    }
    Ok(())
}

fn build(ctx: &Context, cov: DMatrix<f64>, means: DVector<f64>) -> Result<State> {
    State::builder().gaussian(cov, means).context(ctx.clone()).build()
}

fn displacement_means(ctx: &Context, x: &[f64], y: &[f64]) -> DVector<f64> {
    let scale = (2.0 * ctx.hbar()).sqrt();
    DVector::from_iterator(2 * x.len(), x.iter().chain(y.iter()).map(|v| v * scale))
}

/// Single-mode squeezed covariances placed block-diagonally in xxpp ordering
fn squeezed_cov(ctx: &Context, r: &[f64], phi: &[f64]) -> DMatrix<f64> {
    let n = r.len();
    let half = ctx.hbar() / 2.0;
    let mut cov = DMatrix::zeros(2 * n, 2 * n);
    for i in 0..n {
        let (ch, sh) = ((2.0 * r[i]).cosh(), (2.0 * r[i]).sinh());
        let (c, s) = (phi[i].cos(), phi[i].sin());
        cov[(i, i)] = half * (ch - sh * c);
        cov[(i + n, i + n)] = half * (ch + sh * c);
        cov[(i, i + n)] = -half * sh * s;
        cov[(i + n, i)] = -half * sh * s;
    }
    cov
}

/// Vacuum on `num_modes` modes
pub fn vacuum(ctx: &Context, num_modes: usize) -> Result<State> {
    let cov = DMatrix::identity(2 * num_modes, 2 * num_modes) * (ctx.hbar() / 2.0);
    build(ctx, cov, DVector::zeros(2 * num_modes))
}

/// Coherent state with amplitudes `x + i·y`
pub fn coherent(ctx: &Context, x: &[f64], y: &[f64]) -> Result<State> {
    check_lengths("coherent", x.len(), y.len())?;
    let n = x.len();
    let cov = DMatrix::identity(2 * n, 2 * n) * (ctx.hbar() / 2.0);
    build(ctx, cov, displacement_means(ctx, x, y))
}

/// Squeezed vacuum with squeezing `r` along angle `phi`
pub fn squeezed_vacuum(ctx: &Context, r: &[f64], phi: &[f64]) -> Result<State> {
    check_lengths("squeezed vacuum", r.len(), phi.len())?;
    build(ctx, squeezed_cov(ctx, r, phi), DVector::zeros(2 * r.len()))
}

/// Squeezed state displaced by `x + i·y`
pub fn displaced_squeezed(ctx: &Context, r: &[f64], phi: &[f64], x: &[f64], y: &[f64]) -> Result<State> {
    let n = r.len();
    check_lengths("displaced squeezed", n, phi.len())?;
    check_lengths("displaced squeezed", n, x.len())?;
    check_lengths("displaced squeezed", n, y.len())?;
    build(ctx, squeezed_cov(ctx, r, phi), displacement_means(ctx, x, y))
}

/// Thermal state with mean photon numbers `nbar`
pub fn thermal(ctx: &Context, nbar: &[f64]) -> Result<State> {
    if let Some(&bad) = nbar.iter().find(|&&v| !(v >= 0.0) || !v.is_finite()) {
        return Err(CvError::InvalidParameter(format!(
            "thermal photon number must be non-negative, got {}",
            bad
        )));
    }
    let n = nbar.len();
    let diag = DVector::from_fn(2 * n, |k, _| ctx.hbar() / 2.0 * (2.0 * nbar[k % n] + 1.0));
    build(ctx, DMatrix::from_diagonal(&diag), DVector::zeros(2 * n))
}

/// Two-mode squeezed vacuum `S₂(r, φ)|0, 0⟩`
pub fn two_mode_squeezed_vacuum(ctx: &Context, r: f64, phi: f64) -> Result<State> {
    let (ch, sh) = (r.cosh(), r.sinh());
    let (cp, sp) = (phi.cos(), phi.sin());
    #[rustfmt::skip]
    let s2 = DMatrix::from_row_slice(4, 4, &[
        ch,      cp * sh, 0.0,      sp * sh,
        cp * sh, ch,      sp * sh,  0.0,
        0.0,     sp * sh, ch,      -cp * sh,
        sp * sh, 0.0,    -cp * sh,  ch,
    ]);
    let cov = &s2 * s2.transpose() * (ctx.hbar() / 2.0);
    build(ctx, (&cov + cov.transpose()) * 0.5, DVector::zeros(4))
}

/// Number state `|n_1, …, n_k⟩`
///
/// Cutoffs default to `n_i + 1` per mode.
pub fn fock(ctx: &Context, photons: &[usize], cutoffs: Option<&[usize]>) -> Result<State> {
    let cutoffs: Vec<usize> = match cutoffs {
        Some(c) => {
            check_lengths("number state cutoffs", photons.len(), c.len())?;
            c.to_vec()
        }
        None => photons.iter().map(|n| n + 1).collect(),
    };
    if let Some((n, c)) = photons.iter().zip(&cutoffs).find(|(n, c)| n >= c) {
        return Err(CvError::InvalidParameter(format!(
            "photon number {} does not fit cutoff {}",
            n, c
        )));
    }

    let mut ket = ArrayD::zeros(IxDyn(&cutoffs));
    ket[photons] = Complex64::new(1.0, 0.0);
    State::builder().ket(ket).context(ctx.clone()).build()
}
