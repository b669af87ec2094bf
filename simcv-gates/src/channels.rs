//! Noisy Gaussian channels
//!
//! Each channel takes one parameter per mode. Noise matrices scale with
//! `hbar/2`, the vacuum variance.

use crate::binding::{per_mode_bounded, values};
use crate::symplectic;
use nalgebra::{DMatrix, DVector};
use simcv_core::{Parameter, Result, TrainableParameters};
use simcv_state::Transformation;

/// Pure loss with transmissivity `eta ∈ [0, 1]`
///
/// `X = sqrt(eta)·I`, `Y = (1 − eta)·hbar/2·I`.
#[derive(Debug, Clone)]
pub struct Attenuator {
    eta: Vec<Parameter>,
    modes: Option<Vec<usize>>,
}

impl Attenuator {
    /// # Errors
    /// Returns error if any transmissivity lies outside `[0, 1]`
    pub fn new(eta: &[f64]) -> Result<Self> {
        Ok(Self {
            eta: per_mode_bounded("eta", eta, 0.0, 1.0)?,
            modes: None,
        })
    }

    pub fn num_modes(&self) -> usize {
        self.eta.len()
    }
}

impl_mode_binding!(Attenuator, [eta]);

impl Transformation for Attenuator {
    fn name(&self) -> &str {
        "Attenuator"
    }

    fn modes(&self) -> Option<&[usize]> {
        self.modes.as_deref()
    }

    fn x_matrix(&self) -> Option<DMatrix<f64>> {
        Some(symplectic::gain_x(&values(&self.eta)))
    }

    fn y_matrix(&self, hbar: f64) -> Option<DMatrix<f64>> {
        let noise: Vec<f64> = values(&self.eta).iter().map(|e| 1.0 - e).collect();
        Some(symplectic::isotropic_noise(&noise, hbar))
    }

    fn d_vector(&self, _hbar: f64) -> Option<DVector<f64>> {
        None
    }

    fn trainable_parameters(&self) -> TrainableParameters {
        self.collect_trainable()
    }

    fn is_unitary(&self) -> bool {
        false
    }
}

/// Phase-insensitive amplifier with gain `g ≥ 1`
///
/// `X = sqrt(g)·I`, `Y = (g − 1)·hbar/2·I`.
#[derive(Debug, Clone)]
pub struct Amplifier {
    gain: Vec<Parameter>,
    modes: Option<Vec<usize>>,
}

impl Amplifier {
    /// # Errors
    /// Returns error if any gain is below 1
    pub fn new(gain: &[f64]) -> Result<Self> {
        Ok(Self {
            gain: per_mode_bounded("gain", gain, 1.0, f64::INFINITY)?,
            modes: None,
        })
    }

    pub fn num_modes(&self) -> usize {
        self.gain.len()
    }
}

impl_mode_binding!(Amplifier, [gain]);

impl Transformation for Amplifier {
    fn name(&self) -> &str {
        "Amplifier"
    }

    fn modes(&self) -> Option<&[usize]> {
        self.modes.as_deref()
    }

    fn x_matrix(&self) -> Option<DMatrix<f64>> {
        Some(symplectic::gain_x(&values(&self.gain)))
    }

    fn y_matrix(&self, hbar: f64) -> Option<DMatrix<f64>> {
        let noise: Vec<f64> = values(&self.gain).iter().map(|g| g - 1.0).collect();
        Some(symplectic::isotropic_noise(&noise, hbar))
    }

    fn d_vector(&self, _hbar: f64) -> Option<DVector<f64>> {
        None
    }

    fn trainable_parameters(&self) -> TrainableParameters {
        self.collect_trainable()
    }

    fn is_unitary(&self) -> bool {
        false
    }
}

/// Classical Gaussian noise of `noise ≥ 0` vacuum units added to both quadratures
#[derive(Debug, Clone)]
pub struct AdditiveNoise {
    noise: Vec<Parameter>,
    modes: Option<Vec<usize>>,
}

impl AdditiveNoise {
    /// # Errors
    /// Returns error if any noise level is negative
    pub fn new(noise: &[f64]) -> Result<Self> {
        Ok(Self {
            noise: per_mode_bounded("noise", noise, 0.0, f64::INFINITY)?,
            modes: None,
        })
    }

    pub fn num_modes(&self) -> usize {
        self.noise.len()
    }
}

impl_mode_binding!(AdditiveNoise, [noise]);

impl Transformation for AdditiveNoise {
    fn name(&self) -> &str {
        "AdditiveNoise"
    }

    fn modes(&self) -> Option<&[usize]> {
        self.modes.as_deref()
    }

    fn x_matrix(&self) -> Option<DMatrix<f64>> {
        None
    }

    fn y_matrix(&self, hbar: f64) -> Option<DMatrix<f64>> {
        Some(symplectic::isotropic_noise(&values(&self.noise), hbar))
    }

    fn d_vector(&self, _hbar: f64) -> Option<DVector<f64>> {
        None
    }

    fn trainable_parameters(&self) -> TrainableParameters {
        self.collect_trainable()
    }

    fn is_unitary(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use simcv_state::{preparations, Context};

    const TOL: f64 = 1e-10;

    #[test]
    fn test_bounds() {
        assert!(Attenuator::new(&[1.2]).is_err());
        assert!(Attenuator::new(&[0.0, 1.0]).is_ok());
        assert!(Amplifier::new(&[0.9]).is_err());
        assert!(AdditiveNoise::new(&[-0.1]).is_err());
    }

    #[test]
    fn test_full_loss_gives_vacuum() {
        let ctx = Context::default();
        let state = preparations::coherent(&ctx, &[1.0], &[0.5]).unwrap();
        let out = Attenuator::new(&[0.0]).unwrap().apply(&state).unwrap();
        assert_eq!(out, preparations::vacuum(&ctx, 1).unwrap());
    }

    #[test]
    fn test_amplifier_on_vacuum_is_thermal() {
        let ctx = Context::default();
        let vacuum = preparations::vacuum(&ctx, 1).unwrap();
        let out = Amplifier::new(&[2.0]).unwrap().apply(&vacuum).unwrap();
        assert_relative_eq!(out.number_means().unwrap()[0], 1.0, epsilon = TOL);
        assert!(!Amplifier::new(&[2.0]).unwrap().is_unitary());
    }

    #[test]
    fn test_noiseless_settings_are_still_channels() {
        let ctx = Context::default();
        let identity_loss = Attenuator::new(&[1.0]).unwrap();
        let silent = AdditiveNoise::new(&[0.0]).unwrap();
        let unit_gain = Amplifier::new(&[1.0]).unwrap();
        assert!(!identity_loss.is_unitary());
        assert!(!silent.is_unitary());
        assert!(!unit_gain.is_unitary());

        let state = preparations::squeezed_vacuum(&ctx, &[0.4], &[0.2]).unwrap();
        let out = identity_loss.apply(&state).unwrap();
        assert_eq!(out, state);
        assert_relative_eq!(out.purity().unwrap(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_additive_noise_on_vacuum() {
        let ctx = Context::default();
        let vacuum = preparations::vacuum(&ctx, 1).unwrap();
        let out = AdditiveNoise::new(&[1.0]).unwrap().apply(&vacuum).unwrap();
        assert_eq!(out, preparations::thermal(&ctx, &[0.5]).unwrap());
    }
}
