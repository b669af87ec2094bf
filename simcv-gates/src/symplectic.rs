//! Phase-space matrices of the standard Gaussian operations
//!
//! All matrices use xxpp ordering over the modes they act on. Per-mode
//! operations take one parameter per mode and place their 2×2 blocks on
//! rows/columns `i` and `i + n`.

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;

/// Place per-mode 2×2 blocks `[[a, b], [c, d]]` into a 2n×2n matrix
fn block_diagonal(blocks: &[[f64; 4]]) -> DMatrix<f64> {
    let n = blocks.len();
    let mut m = DMatrix::zeros(2 * n, 2 * n);
    for (i, [a, b, c, d]) in blocks.iter().enumerate() {
        m[(i, i)] = *a;
        m[(i, i + n)] = *b;
        m[(i + n, i)] = *c;
        m[(i + n, i + n)] = *d;
    }
    m
}

/// Displacement vector `sqrt(2·hbar)·(x, y)` for amplitudes `x + i·y`
pub fn displacement(x: &[f64], y: &[f64], hbar: f64) -> DVector<f64> {
    let scale = (2.0 * hbar).sqrt();
    DVector::from_iterator(x.len() + y.len(), x.iter().chain(y).map(|v| v * scale))
}

/// Single-mode squeezing `S(r, φ)`
pub fn squeezing(r: &[f64], phi: &[f64]) -> DMatrix<f64> {
    let blocks: Vec<[f64; 4]> = r
        .iter()
        .zip(phi)
        .map(|(&r, &phi)| {
            let (ch, sh) = (r.cosh(), r.sinh());
            let (c, s) = (phi.cos(), phi.sin());
            [ch - sh * c, -sh * s, -sh * s, ch + sh * c]
        })
        .collect();
    block_diagonal(&blocks)
}

/// Phase-space rotation by `φ`
pub fn rotation(phi: &[f64]) -> DMatrix<f64> {
    let blocks: Vec<[f64; 4]> = phi
        .iter()
        .map(|&phi| {
            let (c, s) = (phi.cos(), phi.sin());
            [c, -s, s, c]
        })
        .collect();
    block_diagonal(&blocks)
}

/// Beam splitter with transmissivity `cos²θ` and phase `φ`
///
/// Real form `[[Re B, −Im B], [Im B, Re B]]` of the mode-space unitary
/// `B = [[cos θ, −e^{−iφ} sin θ], [e^{iφ} sin θ, cos θ]]`.
pub fn beam_splitter(theta: f64, phi: f64) -> DMatrix<f64> {
    let (ct, st) = (theta.cos(), theta.sin());
    let b = [
        [Complex64::new(ct, 0.0), -Complex64::from_polar(st, -phi)],
        [Complex64::from_polar(st, phi), Complex64::new(ct, 0.0)],
    ];
    DMatrix::from_fn(4, 4, |r, c| {
        let z = b[r % 2][c % 2];
        match (r < 2, c < 2) {
            (true, true) | (false, false) => z.re,
            (true, false) => -z.im,
            (false, true) => z.im,
        }
    })
}

/// Two-mode squeezing `S₂(r, φ)`
pub fn two_mode_squeezing(r: f64, phi: f64) -> DMatrix<f64> {
    let (ch, sh) = (r.cosh(), r.sinh());
    let (cp, sp) = (phi.cos(), phi.sin());
    #[rustfmt::skip]
    let m = DMatrix::from_row_slice(4, 4, &[
        ch,      cp * sh, 0.0,      sp * sh,
        cp * sh, ch,      sp * sh,  0.0,
        0.0,     sp * sh, ch,      -cp * sh,
        sp * sh, 0.0,    -cp * sh,  ch,
    ]);
    m
}

/// Passive linear optics from a real orthogonal mode matrix: `diag(O, O)`
pub fn real_interferometer(orthogonal: &DMatrix<f64>) -> DMatrix<f64> {
    let n = orthogonal.nrows();
    let mut m = DMatrix::zeros(2 * n, 2 * n);
    m.view_mut((0, 0), (n, n)).copy_from(orthogonal);
    m.view_mut((n, n), (n, n)).copy_from(orthogonal);
    m
}

/// Linear part `sqrt(g)·I` shared by loss (`g ≤ 1`) and amplification (`g ≥ 1`)
pub fn gain_x(gain: &[f64]) -> DMatrix<f64> {
    let diag = DVector::from_fn(2 * gain.len(), |k, _| gain[k % gain.len()].sqrt());
    DMatrix::from_diagonal(&diag)
}

/// Isotropic noise `hbar/2 · noise_i` on each mode
pub fn isotropic_noise(noise: &[f64], hbar: f64) -> DMatrix<f64> {
    let diag = DVector::from_fn(2 * noise.len(), |k, _| noise[k % noise.len()] * hbar / 2.0);
    DMatrix::from_diagonal(&diag)
}
