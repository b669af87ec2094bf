//! Unitary Gaussian gates
//!
//! Single-mode gates take one parameter per mode and act on as many modes.
//! An unbound gate acts on every mode of the input state; use `on` to bind
//! it to specific labels.

use crate::binding::{check_lengths, per_mode, per_mode_bounded, values};
use crate::symplectic;
use nalgebra::{DMatrix, DVector};
use simcv_core::{CvError, Parameter, ParameterKind, Result, Settings, TrainableParameters};
use simcv_state::validation::{is_orthogonal, is_symplectic};
use simcv_state::Transformation;

/// Displacement by `α = x + i·y` per mode
#[derive(Debug, Clone)]
pub struct Dgate {
    x: Vec<Parameter>,
    y: Vec<Parameter>,
    modes: Option<Vec<usize>>,
}

impl Dgate {
    pub fn new(x: &[f64], y: &[f64]) -> Result<Self> {
        check_lengths("Dgate", x.len(), y.len())?;
        Ok(Self {
            x: per_mode("x", x),
            y: per_mode("y", y),
            modes: None,
        })
    }

    pub fn num_modes(&self) -> usize {
        self.x.len()
    }
}

impl_mode_binding!(Dgate, [x, y]);

impl Transformation for Dgate {
    fn name(&self) -> &str {
        "Dgate"
    }

    fn modes(&self) -> Option<&[usize]> {
        self.modes.as_deref()
    }

    fn x_matrix(&self) -> Option<DMatrix<f64>> {
        None
    }

    fn y_matrix(&self, _hbar: f64) -> Option<DMatrix<f64>> {
        None
    }

    fn d_vector(&self, hbar: f64) -> Option<DVector<f64>> {
        Some(symplectic::displacement(&values(&self.x), &values(&self.y), hbar))
    }

    fn trainable_parameters(&self) -> TrainableParameters {
        self.collect_trainable()
    }
}

/// Squeezing with magnitude `r ≥ 0` along angle `phi`
#[derive(Debug, Clone)]
pub struct Sgate {
    r: Vec<Parameter>,
    phi: Vec<Parameter>,
    modes: Option<Vec<usize>>,
}

impl Sgate {
    /// # Errors
    /// Returns error on mismatched lengths or negative `r`
    pub fn new(r: &[f64], phi: &[f64]) -> Result<Self> {
        check_lengths("Sgate", r.len(), phi.len())?;
        Ok(Self {
            r: per_mode_bounded("r", r, 0.0, f64::INFINITY)?,
            phi: per_mode("phi", phi),
            modes: None,
        })
    }

    pub fn num_modes(&self) -> usize {
        self.r.len()
    }
}

impl_mode_binding!(Sgate, [r, phi]);

impl Transformation for Sgate {
    fn name(&self) -> &str {
        "Sgate"
    }

    fn modes(&self) -> Option<&[usize]> {
        self.modes.as_deref()
    }

    fn x_matrix(&self) -> Option<DMatrix<f64>> {
        Some(symplectic::squeezing(&values(&self.r), &values(&self.phi)))
    }

    fn y_matrix(&self, _hbar: f64) -> Option<DMatrix<f64>> {
        None
    }

    fn d_vector(&self, _hbar: f64) -> Option<DVector<f64>> {
        None
    }

    fn trainable_parameters(&self) -> TrainableParameters {
        self.collect_trainable()
    }
}

/// Phase rotation
#[derive(Debug, Clone)]
pub struct Rgate {
    angle: Vec<Parameter>,
    modes: Option<Vec<usize>>,
}

impl Rgate {
    pub fn new(angle: &[f64]) -> Self {
        Self {
            angle: per_mode("angle", angle),
            modes: None,
        }
    }

    pub fn num_modes(&self) -> usize {
        self.angle.len()
    }
}

impl_mode_binding!(Rgate, [angle]);

impl Transformation for Rgate {
    fn name(&self) -> &str {
        "Rgate"
    }

    fn modes(&self) -> Option<&[usize]> {
        self.modes.as_deref()
    }

    fn x_matrix(&self) -> Option<DMatrix<f64>> {
        Some(symplectic::rotation(&values(&self.angle)))
    }

    fn y_matrix(&self, _hbar: f64) -> Option<DMatrix<f64>> {
        None
    }

    fn d_vector(&self, _hbar: f64) -> Option<DVector<f64>> {
        None
    }

    fn trainable_parameters(&self) -> TrainableParameters {
        self.collect_trainable()
    }
}

/// Two-mode beam splitter; `theta = π/4` is balanced
#[derive(Debug, Clone)]
pub struct BSgate {
    theta: Parameter,
    phi: Parameter,
    modes: Option<Vec<usize>>,
}

impl BSgate {
    pub fn new(theta: f64, phi: f64) -> Self {
        Self {
            theta: Parameter::named("theta", theta),
            phi: Parameter::named("phi", phi),
            modes: None,
        }
    }

    pub fn num_modes(&self) -> usize {
        2
    }
}

impl_mode_binding!(BSgate, [theta, phi]);

impl Transformation for BSgate {
    fn name(&self) -> &str {
        "BSgate"
    }

    fn modes(&self) -> Option<&[usize]> {
        self.modes.as_deref()
    }

    fn x_matrix(&self) -> Option<DMatrix<f64>> {
        Some(symplectic::beam_splitter(self.theta.value(), self.phi.value()))
    }

    fn y_matrix(&self, _hbar: f64) -> Option<DMatrix<f64>> {
        None
    }

    fn d_vector(&self, _hbar: f64) -> Option<DVector<f64>> {
        None
    }

    fn trainable_parameters(&self) -> TrainableParameters {
        self.collect_trainable()
    }
}

/// Two-mode squeezing with magnitude `r ≥ 0` and phase `phi`
#[derive(Debug, Clone)]
pub struct S2gate {
    r: Parameter,
    phi: Parameter,
    modes: Option<Vec<usize>>,
}

impl S2gate {
    /// # Errors
    /// Returns error if `r` is negative
    pub fn new(r: f64, phi: f64) -> Result<Self> {
        Ok(Self {
            r: Parameter::named("r", r).with_bounds(0.0, f64::INFINITY)?,
            phi: Parameter::named("phi", phi),
            modes: None,
        })
    }

    pub fn num_modes(&self) -> usize {
        2
    }
}

impl_mode_binding!(S2gate, [r, phi]);

impl Transformation for S2gate {
    fn name(&self) -> &str {
        "S2gate"
    }

    fn modes(&self) -> Option<&[usize]> {
        self.modes.as_deref()
    }

    fn x_matrix(&self) -> Option<DMatrix<f64>> {
        Some(symplectic::two_mode_squeezing(self.r.value(), self.phi.value()))
    }

    fn y_matrix(&self, _hbar: f64) -> Option<DMatrix<f64>> {
        None
    }

    fn d_vector(&self, _hbar: f64) -> Option<DVector<f64>> {
        None
    }

    fn trainable_parameters(&self) -> TrainableParameters {
        self.collect_trainable()
    }
}

/// Passive interferometer given by a real orthogonal mode matrix
#[derive(Debug, Clone)]
pub struct RealInterferometer {
    orthogonal: Parameter,
    modes: Option<Vec<usize>>,
}

impl RealInterferometer {
    /// # Errors
    /// Returns error if the matrix is not orthogonal within the default tolerance
    pub fn new(orthogonal: DMatrix<f64>) -> Result<Self> {
        if !is_orthogonal(&orthogonal, Settings::default().tolerance) {
            return Err(CvError::InvalidParameter(
                "interferometer matrix is not orthogonal".to_string(),
            ));
        }
        Ok(Self {
            orthogonal: Parameter::matrix("orthogonal", orthogonal, ParameterKind::Orthogonal)?,
            modes: None,
        })
    }

    pub fn num_modes(&self) -> usize {
        self.orthogonal.as_matrix().map_or(0, |m| m.nrows())
    }
}

impl_mode_binding!(RealInterferometer, [orthogonal]);

impl Transformation for RealInterferometer {
    fn name(&self) -> &str {
        "RealInterferometer"
    }

    fn modes(&self) -> Option<&[usize]> {
        self.modes.as_deref()
    }

    fn x_matrix(&self) -> Option<DMatrix<f64>> {
        self.orthogonal.as_matrix().map(symplectic::real_interferometer)
    }

    fn y_matrix(&self, _hbar: f64) -> Option<DMatrix<f64>> {
        None
    }

    fn d_vector(&self, _hbar: f64) -> Option<DVector<f64>> {
        None
    }

    fn trainable_parameters(&self) -> TrainableParameters {
        self.collect_trainable()
    }
}

/// General Gaussian unitary given by its symplectic matrix
#[derive(Debug, Clone)]
pub struct Ggate {
    symplectic: Parameter,
    modes: Option<Vec<usize>>,
}

impl Ggate {
    /// # Errors
    /// Returns error if the matrix is not symplectic within the default tolerance
    pub fn new(symplectic: DMatrix<f64>) -> Result<Self> {
        if !is_symplectic(&symplectic, Settings::default().tolerance) {
            return Err(CvError::InvalidParameter("Ggate matrix is not symplectic".to_string()));
        }
        Ok(Self {
            symplectic: Parameter::matrix("symplectic", symplectic, ParameterKind::Symplectic)?,
            modes: None,
        })
    }

    pub fn num_modes(&self) -> usize {
        self.symplectic.as_matrix().map_or(0, |m| m.nrows() / 2)
    }
}

impl_mode_binding!(Ggate, [symplectic]);

impl Transformation for Ggate {
    fn name(&self) -> &str {
        "Ggate"
    }

    fn modes(&self) -> Option<&[usize]> {
        self.modes.as_deref()
    }

    fn x_matrix(&self) -> Option<DMatrix<f64>> {
        self.symplectic.as_matrix().cloned()
    }

    fn y_matrix(&self, _hbar: f64) -> Option<DMatrix<f64>> {
        None
    }

    fn d_vector(&self, _hbar: f64) -> Option<DVector<f64>> {
        None
    }

    fn trainable_parameters(&self) -> TrainableParameters {
        self.collect_trainable()
    }
}
