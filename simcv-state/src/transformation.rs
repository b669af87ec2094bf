//! Gaussian channels acting on states
//!
//! A transformation is described by its linear part `X`, its noise `Y` and
//! its displacement `d`, all pure functions of the parameters. Concrete
//! gates and channels live in `simcv-gates`.

use crate::gaussian;
use crate::state::State;
use nalgebra::{DMatrix, DVector};
use simcv_core::{CvError, Result, TrainableParameters};
use std::fmt;

/// Trait for Gaussian transformations
///
/// `X` and `Y` act on `2k` quadratures (xxpp ordering over the `k` acting
/// modes) and `d` has length `2k`. `None` stands for identity `X`, zero `Y`
/// or zero `d`.
pub trait Transformation: Send + Sync + fmt::Debug {
    /// Transformation name
    fn name(&self) -> &str;

    /// Mode labels this transformation is bound to; `None` acts on every
    /// mode of the input state
    fn modes(&self) -> Option<&[usize]>;

    /// Linear part
    fn x_matrix(&self) -> Option<DMatrix<f64>>;

    /// Additive noise
    fn y_matrix(&self, hbar: f64) -> Option<DMatrix<f64>>;

    /// Displacement
    fn d_vector(&self, hbar: f64) -> Option<DVector<f64>>;

    /// Parameters grouped by geometry, frozen ones excluded
    fn trainable_parameters(&self) -> TrainableParameters;

    /// Whether the transformation is a unitary gate
    ///
    /// Structural: channels that add noise return `false` for every
    /// parameter value and every `hbar`.
    fn is_unitary(&self) -> bool {
        true
    }

    /// Apply to a Gaussian state
    fn apply(&self, state: &State) -> Result<State> {
        let (cov, means) = state.gaussian_parts().ok_or_else(|| {
            CvError::Unsupported(format!("{} on a non-Gaussian state", self.name()))
        })?;
        let hbar = state.hbar();
        let indices = acting_indices(self.modes(), state)?;

        let x = self.x_matrix();
        let y = self.y_matrix(hbar);
        let d = self.d_vector(hbar);
        let (new_cov, new_means) =
            gaussian::cptp(cov, means, x.as_ref(), y.as_ref(), d.as_ref(), &indices)?;

        let output = state.derived_gaussian(state.modes().to_vec(), new_cov, new_means, state.norm());
        if y.is_none() {
            let purity = state.purity()?;
            if (purity - 1.0).abs() < state.context().tolerance() {
                return Ok(output.with_purity(purity));
            }
        }
        Ok(output)
    }

    /// Apply the dual channel `(X⁻¹, X⁻¹ Y X⁻ᵀ, −X⁻¹ d)` to a Gaussian state
    ///
    /// The state's norm is multiplied by `1/|det X|`.
    fn dual(&self, state: &State) -> Result<State> {
        let (cov, means) = state.gaussian_parts().ok_or_else(|| {
            CvError::Unsupported(format!("dual of {} on a non-Gaussian state", self.name()))
        })?;
        let hbar = state.hbar();
        let indices = acting_indices(self.modes(), state)?;

        let local = 2 * indices.len();
        let x = self.x_matrix().unwrap_or_else(|| DMatrix::identity(local, local));
        let y = self.y_matrix(hbar);
        let d = self.d_vector(hbar);
        let dual = gaussian::dual_channel(&x, y.as_ref(), d.as_ref(), state.context().backend())?;

        let (new_cov, new_means) = gaussian::cptp(
            cov,
            means,
            Some(&dual.x),
            dual.y.as_ref(),
            dual.d.as_ref(),
            &indices,
        )?;
        Ok(state.derived_gaussian(
            state.modes().to_vec(),
            new_cov,
            new_means,
            state.norm() * dual.norm_factor,
        ))
    }
}

fn acting_indices(modes: Option<&[usize]>, state: &State) -> Result<Vec<usize>> {
    match modes {
        Some(labels) => state.indices(labels),
        None => Ok((0..state.num_modes()).collect()),
    }
}
