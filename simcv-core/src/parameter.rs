//! Trainable parameters grouped by the geometry an optimizer must respect

use crate::{CvError, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Manifold on which a parameter lives
///
/// Optimizers apply a different update rule to each kind: Riemannian steps on
/// the symplectic and orthogonal groups, plain gradient steps otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterKind {
    /// Symplectic matrix parameter
    Symplectic,
    /// Orthogonal matrix parameter
    Orthogonal,
    /// Unconstrained real parameter
    Euclidean,
}

/// Value carried by a parameter
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    Scalar(f64),
    Matrix(DMatrix<f64>),
}

/// A transformation parameter with optional bounds
///
/// # Example
/// ```
/// use simcv_core::parameter::{Parameter, ParameterKind};
///
/// let mut r = Parameter::named("r", 0.5).with_bounds(0.0, 2.0).unwrap();
/// assert_eq!(r.value(), 0.5);
/// assert_eq!(r.kind(), ParameterKind::Euclidean);
///
/// r.set_value(1.5).unwrap();
/// assert!(r.set_value(3.0).is_err());
/// ```
#[derive(Clone, Debug)]
pub struct Parameter {
    name: Option<String>,
    value: ParameterValue,
    kind: ParameterKind,
    bounds: Option<(f64, f64)>,
    frozen: bool,
}

impl Parameter {
    /// Create a euclidean scalar parameter
    pub fn new(value: f64) -> Self {
        Self {
            name: None,
            value: ParameterValue::Scalar(value),
            kind: ParameterKind::Euclidean,
            bounds: None,
            frozen: false,
        }
    }

    /// Create a named euclidean scalar parameter
    pub fn named(name: impl Into<String>, value: f64) -> Self {
        Self::new(value).with_name(name)
    }

    /// Create a matrix parameter on the given manifold
    ///
    /// # Errors
    /// Returns error if the matrix is not square or `kind` is euclidean
    pub fn matrix(name: impl Into<String>, value: DMatrix<f64>, kind: ParameterKind) -> Result<Self> {
        if !value.is_square() {
            return Err(CvError::InvalidParameter(format!(
                "matrix parameter must be square, got {}x{}",
                value.nrows(),
                value.ncols()
            )));
        }
        if kind == ParameterKind::Euclidean {
            return Err(CvError::InvalidParameter(
                "matrix parameters must be symplectic or orthogonal".to_string(),
            ));
        }
        Ok(Self {
            name: Some(name.into()),
            value: ParameterValue::Matrix(value),
            kind,
            bounds: None,
            frozen: false,
        })
    }

    #[inline]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[inline]
    pub fn kind(&self) -> ParameterKind {
        self.kind
    }

    /// Scalar value (0.0 for matrix parameters)
    #[inline]
    pub fn value(&self) -> f64 {
        match &self.value {
            ParameterValue::Scalar(v) => *v,
            ParameterValue::Matrix(_) => 0.0,
        }
    }

    /// Matrix value, if this is a matrix parameter
    pub fn as_matrix(&self) -> Option<&DMatrix<f64>> {
        match &self.value {
            ParameterValue::Matrix(m) => Some(m),
            ParameterValue::Scalar(_) => None,
        }
    }

    /// Raw value
    pub fn raw(&self) -> &ParameterValue {
        &self.value
    }

    /// Set a scalar value
    ///
    /// # Errors
    /// Returns error if the parameter is frozen, is a matrix parameter, or
    /// the value violates the bounds
    pub fn set_value(&mut self, value: f64) -> Result<()> {
        if self.frozen {
            return Err(CvError::InvalidParameter(format!(
                "Cannot modify frozen parameter{}",
                self.label()
            )));
        }
        if !matches!(self.value, ParameterValue::Scalar(_)) {
            return Err(CvError::InvalidParameter(format!(
                "Cannot assign a scalar to matrix parameter{}",
                self.label()
            )));
        }
        if let Some((min, max)) = self.bounds {
            if value < min || value > max {
                return Err(CvError::InvalidParameter(format!(
                    "Value {} outside bounds [{}, {}]{}",
                    value,
                    min,
                    max,
                    self.label()
                )));
            }
        }
        self.value = ParameterValue::Scalar(value);
        Ok(())
    }

    /// Set a matrix value (same shape required)
    pub fn set_matrix(&mut self, value: DMatrix<f64>) -> Result<()> {
        if self.frozen {
            return Err(CvError::InvalidParameter(format!(
                "Cannot modify frozen parameter{}",
                self.label()
            )));
        }
        match &self.value {
            ParameterValue::Matrix(m) if m.shape() == value.shape() => {
                self.value = ParameterValue::Matrix(value);
                Ok(())
            }
            ParameterValue::Matrix(m) => Err(CvError::dimension_mismatch(
                "matrix parameter",
                m.nrows(),
                value.nrows(),
            )),
            ParameterValue::Scalar(_) => Err(CvError::InvalidParameter(format!(
                "Cannot assign a matrix to scalar parameter{}",
                self.label()
            ))),
        }
    }

    #[inline]
    pub fn bounds(&self) -> Option<(f64, f64)> {
        self.bounds
    }

    /// Set parameter bounds (builder pattern)
    ///
    /// # Errors
    /// Returns error if min > max or the current value lies outside
    pub fn with_bounds(mut self, min: f64, max: f64) -> Result<Self> {
        if min > max {
            return Err(CvError::InvalidParameter(format!(
                "Invalid bounds: min ({}) > max ({})",
                min, max
            )));
        }
        let value = self.value();
        if value < min || value > max {
            return Err(CvError::InvalidParameter(format!(
                "Value {} outside bounds [{}, {}]{}",
                value,
                min,
                max,
                self.label()
            )));
        }
        self.bounds = Some((min, max));
        Ok(self)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Builder pattern: exclude from training
    pub fn as_frozen(mut self) -> Self {
        self.frozen = true;
        self
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn unfreeze(&mut self) {
        self.frozen = false;
    }

    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn label(&self) -> String {
        self.name
            .as_ref()
            .map(|n| format!(" '{}'", n))
            .unwrap_or_default()
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name.as_deref().unwrap_or("_");
        match &self.value {
            ParameterValue::Scalar(v) => write!(f, "{}={}", name, v)?,
            ParameterValue::Matrix(m) => write!(f, "{}=<{}x{} {:?}>", name, m.nrows(), m.ncols(), self.kind)?,
        }
        if let Some((min, max)) = self.bounds {
            write!(f, " ∈ [{}, {}]", min, max)?;
        }
        if self.frozen {
            write!(f, " (frozen)")?;
        }
        Ok(())
    }
}

/// Trainable parameters bucketed by geometry
#[derive(Debug, Clone, Default)]
pub struct TrainableParameters {
    pub symplectic: Vec<Parameter>,
    pub orthogonal: Vec<Parameter>,
    pub euclidean: Vec<Parameter>,
}

impl TrainableParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route a parameter into its bucket; frozen parameters are skipped
    pub fn push(&mut self, param: &Parameter) {
        if param.is_frozen() {
            return;
        }
        match param.kind() {
            ParameterKind::Symplectic => self.symplectic.push(param.clone()),
            ParameterKind::Orthogonal => self.orthogonal.push(param.clone()),
            ParameterKind::Euclidean => self.euclidean.push(param.clone()),
        }
    }

    /// Collect from an iterator of parameters
    pub fn from_params<'a>(params: impl IntoIterator<Item = &'a Parameter>) -> Self {
        let mut out = Self::new();
        for p in params {
            out.push(p);
        }
        out
    }

    /// Merge another collection into this one
    pub fn extend(&mut self, other: TrainableParameters) {
        self.symplectic.extend(other.symplectic);
        self.orthogonal.extend(other.orthogonal);
        self.euclidean.extend(other.euclidean);
    }

    pub fn len(&self) -> usize {
        self.symplectic.len() + self.orthogonal.len() + self.euclidean.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Parameters of one kind
    pub fn of_kind(&self, kind: ParameterKind) -> &[Parameter] {
        match kind {
            ParameterKind::Symplectic => &self.symplectic,
            ParameterKind::Orthogonal => &self.orthogonal,
            ParameterKind::Euclidean => &self.euclidean,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_creation() {
        let param = Parameter::new(1.5);
        assert_eq!(param.value(), 1.5);
        assert!(param.name().is_none());
        assert!(param.bounds().is_none());
        assert!(!param.is_frozen());
        assert_eq!(param.kind(), ParameterKind::Euclidean);
    }

    #[test]
    fn test_frozen_parameter() {
        let mut param = Parameter::named("x", 1.0);
        param.freeze();
        assert!(param.set_value(2.0).is_err());
        param.unfreeze();
        param.set_value(2.0).unwrap();
        assert_eq!(param.value(), 2.0);
    }

    #[test]
    fn test_bounds() {
        assert!(Parameter::new(1.0).with_bounds(2.0, 0.0).is_err());
        assert!(Parameter::new(5.0).with_bounds(0.0, 2.0).is_err());

        let mut param = Parameter::new(1.0).with_bounds(0.0, 2.0).unwrap();
        param.set_value(1.5).unwrap();
        assert!(param.set_value(3.0).is_err());
        assert_eq!(param.value(), 1.5);
    }

    #[test]
    fn test_matrix_parameter() {
        let m = DMatrix::<f64>::identity(4, 4);
        let param = Parameter::matrix("S", m.clone(), ParameterKind::Symplectic).unwrap();
        assert_eq!(param.as_matrix(), Some(&m));
        assert!(Parameter::matrix("bad", DMatrix::zeros(2, 3), ParameterKind::Orthogonal).is_err());
        assert!(Parameter::matrix("bad", m, ParameterKind::Euclidean).is_err());
    }

    #[test]
    fn test_set_matrix_shape_checked() {
        let mut param =
            Parameter::matrix("O", DMatrix::identity(2, 2), ParameterKind::Orthogonal).unwrap();
        assert!(param.set_matrix(DMatrix::identity(3, 3)).is_err());
        assert!(param.set_value(1.0).is_err());
        param.set_matrix(DMatrix::identity(2, 2) * -1.0).unwrap();
    }

    #[test]
    fn test_grouping_skips_frozen() {
        let s = Parameter::matrix("S", DMatrix::identity(2, 2), ParameterKind::Symplectic).unwrap();
        let o = Parameter::matrix("O", DMatrix::identity(2, 2), ParameterKind::Orthogonal).unwrap();
        let x = Parameter::named("x", 0.1);
        let frozen = Parameter::named("y", 0.2).as_frozen();

        let groups = TrainableParameters::from_params([&s, &o, &x, &frozen]);
        assert_eq!(groups.symplectic.len(), 1);
        assert_eq!(groups.orthogonal.len(), 1);
        assert_eq!(groups.euclidean.len(), 1);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups.of_kind(ParameterKind::Euclidean)[0].name(), Some("x"));
    }

    #[test]
    fn test_display() {
        let param = Parameter::named("eta", 0.5).with_bounds(0.0, 1.0).unwrap().as_frozen();
        let text = format!("{}", param);
        assert!(text.contains("eta=0.5"));
        assert!(text.contains("(frozen)"));
    }
}
