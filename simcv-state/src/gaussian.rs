//! Gaussian engine: channels, partitions, dyne measurement and moments
//!
//! Covariance matrices and means use xxpp ordering: for an `N`-mode state,
//! mode `i` owns row/column `i` (position quadrature) and `i + N` (momentum
//! quadrature). Every function here is a pure function of its inputs; the
//! backend is passed in wherever an inverse or determinant is needed.

use nalgebra::{DMatrix, DVector};
use simcv_backend::NumericBackend;
use simcv_core::{CvError, Result};
use smallvec::SmallVec;

pub(crate) type Rows = SmallVec<[usize; 8]>;

/// Outcome of a generalized Gaussian measurement
#[derive(Debug, Clone, PartialEq)]
pub struct DyneOutcome {
    /// Overlap of the measured block with the projector, `Tr(ρσ)`
    pub probability: f64,
    /// Conditional covariance of the remaining modes
    pub cov: DMatrix<f64>,
    /// Conditional means of the remaining modes
    pub means: DVector<f64>,
}

/// Gaussian channel inverted for dual application
#[derive(Debug, Clone, PartialEq)]
pub struct DualChannel {
    pub x: DMatrix<f64>,
    pub y: Option<DMatrix<f64>>,
    pub d: Option<DVector<f64>>,
    /// Factor `1/|det X|` applied to the state's norm
    pub norm_factor: f64,
}

/// Number of modes described by a covariance matrix
pub fn num_modes(cov: &DMatrix<f64>) -> Result<usize> {
    if !cov.is_square() || cov.nrows() % 2 != 0 {
        return Err(CvError::InvalidState(format!(
            "covariance must be square with even dimension, got {}x{}",
            cov.nrows(),
            cov.ncols()
        )));
    }
    Ok(cov.nrows() / 2)
}

fn check_means(means: &DVector<f64>, modes: usize) -> Result<()> {
    if means.len() != 2 * modes {
        return Err(CvError::dimension_mismatch("means vector", 2 * modes, means.len()));
    }
    Ok(())
}

/// Reject indices that are out of range or repeated
pub fn validate_indices(indices: &[usize], modes: usize) -> Result<()> {
    let available: Vec<usize> = (0..modes).collect();
    for (k, &idx) in indices.iter().enumerate() {
        if idx >= modes || indices[..k].contains(&idx) {
            return Err(CvError::invalid_mode(idx, &available));
        }
    }
    Ok(())
}

/// xxpp rows owned by `indices`: all positions first, then all momenta
pub(crate) fn quadrature_rows(indices: &[usize], modes: usize) -> Rows {
    indices
        .iter()
        .copied()
        .chain(indices.iter().map(|&i| i + modes))
        .collect()
}

/// Mode indices not in `indices`, ascending
pub(crate) fn complement(indices: &[usize], modes: usize) -> Rows {
    (0..modes).filter(|i| !indices.contains(i)).collect()
}

fn select(matrix: &DMatrix<f64>, rows: &[usize], cols: &[usize]) -> DMatrix<f64> {
    DMatrix::from_fn(rows.len(), cols.len(), |r, c| matrix[(rows[r], cols[c])])
}

fn symmetrize(matrix: &DMatrix<f64>) -> DMatrix<f64> {
    (matrix + matrix.transpose()) * 0.5
}

/// Vacuum covariance `hbar/2 · I` for `modes` modes
pub fn vacuum_cov(modes: usize, hbar: f64) -> DMatrix<f64> {
    DMatrix::identity(2 * modes, 2 * modes) * (hbar / 2.0)
}

/// Apply the channel `(X, Y, d)` to the modes at `indices`
///
/// `X`, `Y` and `d` act on `2·len(indices)` quadratures and are embedded into
/// the full space with identity (resp. zero) elsewhere. `None` stands for
/// identity `X`, zero `Y`, zero `d`.
pub fn cptp(
    cov: &DMatrix<f64>,
    means: &DVector<f64>,
    x: Option<&DMatrix<f64>>,
    y: Option<&DMatrix<f64>>,
    d: Option<&DVector<f64>>,
    indices: &[usize],
) -> Result<(DMatrix<f64>, DVector<f64>)> {
    let modes = num_modes(cov)?;
    check_means(means, modes)?;
    validate_indices(indices, modes)?;

    let local = 2 * indices.len();
    for (name, rows, cols) in [
        ("channel X", x.map(|m| m.nrows()), x.map(|m| m.ncols())),
        ("channel Y", y.map(|m| m.nrows()), y.map(|m| m.ncols())),
    ] {
        if let (Some(r), Some(c)) = (rows, cols) {
            if r != local {
                return Err(CvError::dimension_mismatch(name, local, r));
            }
            if c != local {
                return Err(CvError::dimension_mismatch(name, local, c));
            }
        }
    }
    if let Some(d) = d {
        if d.len() != local {
            return Err(CvError::dimension_mismatch("channel d", local, d.len()));
        }
    }

    let rows = quadrature_rows(indices, modes);
    let full = 2 * modes;

    let mut new_cov = cov.clone();
    let mut new_means = means.clone();

    if let Some(x) = x {
        let mut x_full = DMatrix::identity(full, full);
        for (a, &ra) in rows.iter().enumerate() {
            for (b, &rb) in rows.iter().enumerate() {
                x_full[(ra, rb)] = x[(a, b)];
            }
        }
        new_cov = &x_full * new_cov * x_full.transpose();
        new_means = &x_full * new_means;
    }

    if let Some(y) = y {
        for (a, &ra) in rows.iter().enumerate() {
            for (b, &rb) in rows.iter().enumerate() {
                new_cov[(ra, rb)] += y[(a, b)];
            }
        }
    }

    if let Some(d) = d {
        for (a, &ra) in rows.iter().enumerate() {
            new_means[ra] += d[a];
        }
    }

    Ok((new_cov, new_means))
}

/// Split a covariance into `(kept, complement, kept × complement)` blocks
///
/// The kept block follows the order of `keep`; the complement is ascending.
pub fn partition_cov(
    cov: &DMatrix<f64>,
    keep: &[usize],
) -> Result<(DMatrix<f64>, DMatrix<f64>, DMatrix<f64>)> {
    let modes = num_modes(cov)?;
    validate_indices(keep, modes)?;

    let kept = quadrature_rows(keep, modes);
    let rest = quadrature_rows(&complement(keep, modes), modes);

    Ok((
        select(cov, &kept, &kept),
        select(cov, &rest, &rest),
        select(cov, &kept, &rest),
    ))
}

/// Split means into `(kept, complement)`
pub fn partition_means(means: &DVector<f64>, keep: &[usize]) -> Result<(DVector<f64>, DVector<f64>)> {
    if means.len() % 2 != 0 {
        return Err(CvError::InvalidState(format!(
            "means must have even length, got {}",
            means.len()
        )));
    }
    let modes = means.len() / 2;
    validate_indices(keep, modes)?;

    let kept = quadrature_rows(keep, modes);
    let rest = quadrature_rows(&complement(keep, modes), modes);

    Ok((
        DVector::from_iterator(kept.len(), kept.iter().map(|&r| means[r])),
        DVector::from_iterator(rest.len(), rest.iter().map(|&r| means[r])),
    ))
}

/// Project the modes at `measured` onto the Gaussian `(proj_cov, proj_means)`
///
/// Returns the overlap probability and the conditional state of the
/// remaining modes (ascending index order).
pub fn general_dyne(
    cov: &DMatrix<f64>,
    means: &DVector<f64>,
    proj_cov: &DMatrix<f64>,
    proj_means: &DVector<f64>,
    measured: &[usize],
    hbar: f64,
    backend: &dyn NumericBackend,
) -> Result<DyneOutcome> {
    let modes = num_modes(cov)?;
    check_means(means, modes)?;
    validate_indices(measured, modes)?;

    let local = 2 * measured.len();
    if proj_cov.nrows() != local || proj_cov.ncols() != local {
        return Err(CvError::dimension_mismatch("projector covariance", local, proj_cov.nrows()));
    }
    if proj_means.len() != local {
        return Err(CvError::dimension_mismatch("projector means", local, proj_means.len()));
    }

    let (b_block, a_block, ba_block) = partition_cov(cov, measured)?;
    let (b_means, a_means) = partition_means(means, measured)?;

    let sum = &b_block + proj_cov;
    let det = backend.det(&sum);
    if !det.is_finite() || det <= 0.0 {
        return Err(CvError::numerical(format!(
            "dyne measurement: det(B + P) = {} is not positive",
            det
        )));
    }
    let inv = backend.inv(&sum)?;

    let delta = proj_means - &b_means;
    let exponent = (delta.transpose() * &inv * &delta)[(0, 0)];
    let probability = hbar.powi(measured.len() as i32) / det.sqrt() * (-0.5 * exponent).exp();
    if !probability.is_finite() {
        return Err(CvError::numerical("dyne measurement produced a non-finite probability"));
    }

    let ab = ba_block.transpose();
    let gain = &ab * &inv;
    let new_cov = symmetrize(&(&a_block - &gain * ba_block));
    let new_means = a_means + gain * delta;

    Ok(DyneOutcome {
        probability,
        cov: new_cov,
        means: new_means,
    })
}

/// Direct sum of independent covariance matrices
pub fn join_covs(covs: &[&DMatrix<f64>]) -> Result<DMatrix<f64>> {
    let sizes = covs
        .iter()
        .map(|c| num_modes(c))
        .collect::<Result<Vec<_>>>()?;
    let total: usize = sizes.iter().sum();

    let mut joined = DMatrix::zeros(2 * total, 2 * total);
    let mut offset = 0;
    for (cov, &n) in covs.iter().zip(&sizes) {
        for qi in 0..2 {
            for qj in 0..2 {
                for i in 0..n {
                    for j in 0..n {
                        joined[(qi * total + offset + i, qj * total + offset + j)] =
                            cov[(qi * n + i, qj * n + j)];
                    }
                }
            }
        }
        offset += n;
    }
    Ok(joined)
}

/// Concatenate means of independent subsystems per quadrature
pub fn join_means(means: &[&DVector<f64>]) -> Result<DVector<f64>> {
    for m in means {
        if m.len() % 2 != 0 {
            return Err(CvError::InvalidState(format!(
                "means must have even length, got {}",
                m.len()
            )));
        }
    }
    let total: usize = means.iter().map(|m| m.len() / 2).sum();
    let mut joined = DVector::zeros(2 * total);
    let mut offset = 0;
    for m in means {
        let n = m.len() / 2;
        for i in 0..n {
            joined[offset + i] = m[i];
            joined[total + offset + i] = m[n + i];
        }
        offset += n;
    }
    Ok(joined)
}

/// Purity `1/sqrt(det(2V/hbar))`
pub fn purity(cov: &DMatrix<f64>, hbar: f64, backend: &dyn NumericBackend) -> Result<f64> {
    num_modes(cov)?;
    let det = backend.det(&(cov * (2.0 / hbar)));
    if !det.is_finite() || det <= 0.0 {
        return Err(CvError::numerical(format!(
            "purity: covariance determinant {} is not positive",
            det
        )));
    }
    Ok(1.0 / det.sqrt())
}

/// Mean photon number of each mode
pub fn number_means(cov: &DMatrix<f64>, means: &DVector<f64>, hbar: f64) -> Result<DVector<f64>> {
    let n = num_modes(cov)?;
    check_means(means, n)?;
    Ok(DVector::from_fn(n, |i, _| {
        (cov[(i, i)] + cov[(i + n, i + n)] + means[i].powi(2) + means[i + n].powi(2))
            / (2.0 * hbar)
            - 0.5
    }))
}

/// Photon-number covariance matrix between modes
pub fn number_cov(cov: &DMatrix<f64>, means: &DVector<f64>, hbar: f64) -> Result<DMatrix<f64>> {
    let n = num_modes(cov)?;
    check_means(means, n)?;

    let mut result = DMatrix::zeros(n, n);
    for i in 0..n {
        for j in 0..n {
            let mut total = 0.0;
            for qi in 0..2 {
                for qj in 0..2 {
                    let v = cov[(qi * n + i, qj * n + j)];
                    total += v * v + 2.0 * means[qi * n + i] * means[qj * n + j] * v;
                }
            }
            result[(i, j)] = total / (2.0 * hbar * hbar);
        }
        result[(i, i)] -= 0.25;
    }
    Ok(result)
}

/// Covariance `S · diag(ν ⊕ ν) · Sᵀ` from symplectic eigenvalues
///
/// Eigenvalues are in covariance units (vacuum is `hbar/2`).
pub fn symplectic_to_cov(eigenvalues: &DVector<f64>, symplectic: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let n = eigenvalues.len();
    if symplectic.nrows() != 2 * n || symplectic.ncols() != 2 * n {
        return Err(CvError::dimension_mismatch("symplectic matrix", 2 * n, symplectic.nrows()));
    }
    let diag = DVector::from_fn(2 * n, |k, _| eigenvalues[k % n]);
    Ok(symmetrize(&(symplectic * DMatrix::from_diagonal(&diag) * symplectic.transpose())))
}

/// Invert a channel for dual application
///
/// `X⁻¹`, `Y_dual = X⁻¹ Y X⁻ᵀ`, `d_dual = −X⁻¹ d`.
pub fn dual_channel(
    x: &DMatrix<f64>,
    y: Option<&DMatrix<f64>>,
    d: Option<&DVector<f64>>,
    backend: &dyn NumericBackend,
) -> Result<DualChannel> {
    let det = backend.det(x);
    if !det.is_finite() || det == 0.0 {
        return Err(CvError::numerical("dual channel: X is singular"));
    }
    let x_inv = backend.inv(x)?;
    let y_dual = y.map(|y| &x_inv * y * x_inv.transpose());
    let d_dual = d.map(|d| -(&x_inv * d));
    Ok(DualChannel {
        x: x_inv,
        y: y_dual,
        d: d_dual,
        norm_factor: 1.0 / det.abs(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use simcv_backend::NativeBackend;

    const TOL: f64 = 1e-10;
    const HBAR: f64 = 2.0;

    fn tmsv_cov(r: f64) -> DMatrix<f64> {
        let (c, s) = ((2.0 * r).cosh(), (2.0 * r).sinh());
        DMatrix::from_row_slice(
            4,
            4,
            &[
                c, s, 0.0, 0.0, //
                s, c, 0.0, 0.0, //
                0.0, 0.0, c, -s, //
                0.0, 0.0, -s, c,
            ],
        ) * (HBAR / 2.0)
    }

    #[test]
    fn test_cptp_embeds_on_second_mode() {
        let cov = vacuum_cov(2, HBAR);
        let means = DVector::zeros(4);
        let x = DMatrix::from_diagonal(&DVector::from_vec(vec![2.0, 0.5]));
        let d = DVector::from_vec(vec![1.0, -1.0]);

        let (new_cov, new_means) = cptp(&cov, &means, Some(&x), None, Some(&d), &[1]).unwrap();

        assert_relative_eq!(new_cov[(0, 0)], 1.0, epsilon = TOL);
        assert_relative_eq!(new_cov[(1, 1)], 4.0, epsilon = TOL);
        assert_relative_eq!(new_cov[(2, 2)], 1.0, epsilon = TOL);
        assert_relative_eq!(new_cov[(3, 3)], 0.25, epsilon = TOL);
        assert_relative_eq!(new_means, DVector::from_vec(vec![0.0, 1.0, 0.0, -1.0]), epsilon = TOL);
    }

    #[test]
    fn test_cptp_adds_noise() {
        let cov = vacuum_cov(1, HBAR);
        let means = DVector::zeros(2);
        let y = DMatrix::identity(2, 2) * 0.5;
        let (new_cov, _) = cptp(&cov, &means, None, Some(&y), None, &[0]).unwrap();
        assert_relative_eq!(new_cov, DMatrix::identity(2, 2) * 1.5, epsilon = TOL);
    }

    #[test]
    fn test_cptp_rejects_bad_inputs() {
        let cov = vacuum_cov(2, HBAR);
        let means = DVector::zeros(4);
        let x = DMatrix::identity(2, 2);

        assert!(matches!(
            cptp(&cov, &means, Some(&x), None, None, &[0, 1]),
            Err(CvError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            cptp(&cov, &means, Some(&x), None, None, &[2]),
            Err(CvError::InvalidMode { mode: 2, .. })
        ));
        let x4 = DMatrix::identity(4, 4);
        assert!(matches!(
            cptp(&cov, &means, Some(&x4), None, None, &[1, 1]),
            Err(CvError::InvalidMode { mode: 1, .. })
        ));
    }

    #[test]
    fn test_partition_follows_keep_order() {
        let cov = DMatrix::from_fn(6, 6, |r, c| (10 * r + c) as f64);
        let (kept, rest, cross) = partition_cov(&cov, &[2, 0]).unwrap();

        // kept rows: [2, 0, 5, 3]; rest rows: [1, 4]
        assert_eq!(kept[(0, 0)], 22.0);
        assert_eq!(kept[(0, 1)], 20.0);
        assert_eq!(kept[(2, 3)], 53.0);
        assert_eq!(rest, DMatrix::from_row_slice(2, 2, &[11.0, 14.0, 41.0, 44.0]));
        assert_eq!(cross.shape(), (4, 2));
        assert_eq!(cross[(1, 1)], 4.0);

        let means = DVector::from_vec(vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        let (m_kept, m_rest) = partition_means(&means, &[2, 0]).unwrap();
        assert_eq!(m_kept, DVector::from_vec(vec![2.0, 0.0, 5.0, 3.0]));
        assert_eq!(m_rest, DVector::from_vec(vec![1.0, 4.0]));
    }

    #[test]
    fn test_vacuum_projection_on_vacuum() {
        let backend = NativeBackend::default();
        let cov = vacuum_cov(1, HBAR);
        let means = DVector::zeros(2);
        let out = general_dyne(&cov, &means, &cov, &means, &[0], HBAR, &backend).unwrap();
        assert_relative_eq!(out.probability, 1.0, epsilon = TOL);
        assert_eq!(out.cov.nrows(), 0);
    }

    #[test]
    fn test_tmsv_vacuum_projection() {
        let backend = NativeBackend::default();
        let r = 0.6;
        let cov = tmsv_cov(r);
        let means = DVector::zeros(4);
        let proj = vacuum_cov(1, HBAR);
        let out = general_dyne(&cov, &means, &proj, &DVector::zeros(2), &[0], HBAR, &backend).unwrap();

        assert_relative_eq!(out.cov, vacuum_cov(1, HBAR), epsilon = 1e-9);
        assert_relative_eq!(out.probability, 1.0 / r.cosh().powi(2), epsilon = 1e-9);
        assert_relative_eq!(out.means, DVector::zeros(2), epsilon = TOL);
    }

    #[test]
    fn test_tmsv_squeezed_projection() {
        let backend = NativeBackend::default();
        let (r, q): (f64, f64) = (0.4, 0.3);
        let cov = tmsv_cov(r);
        let means = DVector::zeros(4);
        let proj = DMatrix::from_diagonal(&DVector::from_vec(vec![(-2.0 * q).exp(), (2.0 * q).exp()]))
            * (HBAR / 2.0);
        let out = general_dyne(&cov, &means, &proj, &DVector::zeros(2), &[1], HBAR, &backend).unwrap();

        let (c, s) = ((2.0 * r).cosh(), (2.0 * r).sinh());
        let xx = HBAR / 2.0 * (c - s * s / (c + (-2.0 * q).exp()));
        let pp = HBAR / 2.0 * (c - s * s / (c + (2.0 * q).exp()));
        assert_relative_eq!(out.cov[(0, 0)], xx, epsilon = 1e-9);
        assert_relative_eq!(out.cov[(1, 1)], pp, epsilon = 1e-9);
        assert_relative_eq!(out.cov[(0, 1)], out.cov[(1, 0)], epsilon = TOL);
        assert!(out.probability > 0.0 && out.probability <= 1.0);
    }

    #[test]
    fn test_dyne_singular_sum_fails() {
        let backend = NativeBackend::default();
        let cov = DMatrix::zeros(2, 2);
        let means = DVector::zeros(2);
        let result = general_dyne(&cov, &means, &cov, &means, &[0], HBAR, &backend);
        assert!(matches!(result, Err(CvError::NumericalFailure(_))));
    }

    #[test]
    fn test_join_two_vacua() {
        let a = vacuum_cov(1, HBAR);
        let joined = join_covs(&[&a, &a]).unwrap();
        assert_relative_eq!(joined, DMatrix::identity(4, 4), epsilon = TOL);

        let ma = DVector::from_vec(vec![1.0, 2.0]);
        let mb = DVector::from_vec(vec![3.0, 4.0]);
        let joined = join_means(&[&ma, &mb]).unwrap();
        assert_eq!(joined, DVector::from_vec(vec![1.0, 3.0, 2.0, 4.0]));
    }

    #[test]
    fn test_join_then_partition_recovers_blocks() {
        let a = tmsv_cov(0.3);
        let b = DMatrix::from_row_slice(2, 2, &[2.0, 0.3, 0.3, 1.0]);
        let joined = join_covs(&[&a, &b]).unwrap();
        let (kept, _, cross) = partition_cov(&joined, &[0, 1]).unwrap();
        assert_relative_eq!(kept, a, epsilon = TOL);
        assert_relative_eq!(cross, DMatrix::zeros(4, 2), epsilon = TOL);
        let (kept, _, _) = partition_cov(&joined, &[2]).unwrap();
        assert_relative_eq!(kept, b, epsilon = TOL);
    }

    #[test]
    fn test_moments_of_coherent_and_thermal() {
        let cov = vacuum_cov(1, HBAR);
        let means = DVector::from_vec(vec![1.0, 2.0]);
        let nbar = number_means(&cov, &means, HBAR).unwrap();
        assert_relative_eq!(nbar[0], 5.0 / 4.0, epsilon = TOL);
        let ncov = number_cov(&cov, &means, HBAR).unwrap();
        assert_relative_eq!(ncov[(0, 0)], 5.0 / 4.0, epsilon = TOL);

        let thermal = DMatrix::identity(2, 2) * 3.0;
        let zero = DVector::zeros(2);
        assert_relative_eq!(number_means(&thermal, &zero, HBAR).unwrap()[0], 1.0, epsilon = TOL);
        assert_relative_eq!(number_cov(&thermal, &zero, HBAR).unwrap()[(0, 0)], 2.0, epsilon = TOL);
    }

    #[test]
    fn test_purity() {
        let backend = NativeBackend::default();
        assert_relative_eq!(purity(&tmsv_cov(0.8), HBAR, &backend).unwrap(), 1.0, epsilon = 1e-9);
        let thermal = DMatrix::identity(2, 2) * 3.0;
        assert_relative_eq!(purity(&thermal, HBAR, &backend).unwrap(), 1.0 / 3.0, epsilon = TOL);
    }

    #[test]
    fn test_symplectic_to_cov_with_identity() {
        let nu = DVector::from_vec(vec![1.0, 2.0]);
        let cov = symplectic_to_cov(&nu, &DMatrix::identity(4, 4)).unwrap();
        assert_relative_eq!(
            cov,
            DMatrix::from_diagonal(&DVector::from_vec(vec![1.0, 2.0, 1.0, 2.0])),
            epsilon = TOL
        );
    }

    #[test]
    fn test_dual_channel_inverts() {
        let backend = NativeBackend::default();
        let x = DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 0.5]);
        let d = DVector::from_vec(vec![1.0, 1.0]);
        let dual = dual_channel(&x, None, Some(&d), &backend).unwrap();
        assert_relative_eq!(&dual.x * &x, DMatrix::identity(2, 2), epsilon = TOL);
        assert_relative_eq!(dual.d.unwrap(), DVector::from_vec(vec![-0.5, -2.0]), epsilon = TOL);
        assert_relative_eq!(dual.norm_factor, 1.0, epsilon = TOL);

        let singular = DMatrix::zeros(2, 2);
        assert!(dual_channel(&singular, None, None, &backend).is_err());
    }
}
