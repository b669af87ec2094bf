//! Mode binding and parameter plumbing shared by gates and channels

use simcv_core::{CvError, Parameter, Result};

/// A field holding one or more parameters
pub(crate) trait ParameterGroup {
    fn each(&self) -> std::slice::Iter<'_, Parameter>;
    fn each_mut(&mut self) -> std::slice::IterMut<'_, Parameter>;
}

impl ParameterGroup for Vec<Parameter> {
    fn each(&self) -> std::slice::Iter<'_, Parameter> {
        self.iter()
    }

    fn each_mut(&mut self) -> std::slice::IterMut<'_, Parameter> {
        self.iter_mut()
    }
}

impl ParameterGroup for Parameter {
    fn each(&self) -> std::slice::Iter<'_, Parameter> {
        std::slice::from_ref(self).iter()
    }

    fn each_mut(&mut self) -> std::slice::IterMut<'_, Parameter> {
        std::slice::from_mut(self).iter_mut()
    }
}

/// Check a mode list against the number of modes an operation acts on
pub(crate) fn check_modes(expected: usize, modes: &[usize]) -> Result<Vec<usize>> {
    if modes.len() != expected {
        return Err(CvError::dimension_mismatch("mode binding", expected, modes.len()));
    }
    for (i, &mode) in modes.iter().enumerate() {
        if modes[..i].contains(&mode) {
            return Err(CvError::invalid_mode(mode, modes));
        }
    }
    Ok(modes.to_vec())
}

/// One named scalar parameter per mode
pub(crate) fn per_mode(name: &str, values: &[f64]) -> Vec<Parameter> {
    values.iter().map(|&v| Parameter::named(name, v)).collect()
}

/// One named, bounded scalar parameter per mode
pub(crate) fn per_mode_bounded(name: &str, values: &[f64], min: f64, max: f64) -> Result<Vec<Parameter>> {
    values
        .iter()
        .map(|&v| Parameter::named(name, v).with_bounds(min, max))
        .collect()
}

pub(crate) fn values(params: &[Parameter]) -> Vec<f64> {
    params.iter().map(Parameter::value).collect()
}

pub(crate) fn check_lengths(name: &str, expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(CvError::dimension_mismatch(format!("{} parameters", name), expected, actual));
    }
    Ok(())
}

/// Implements mode binding, freezing and parameter collection for an
/// operation whose listed fields implement `ParameterGroup`
macro_rules! impl_mode_binding {
    ($op_type:ty, [$($field:ident),+]) => {
        impl $op_type {
            /// Bind to the given mode labels (one per acting mode)
            ///
            /// # Errors
            /// Returns error on a count mismatch or duplicated label
            pub fn on(mut self, modes: &[usize]) -> simcv_core::Result<Self> {
                self.modes = Some($crate::binding::check_modes(self.num_modes(), modes)?);
                Ok(self)
            }

            /// Exclude every parameter from training
            pub fn frozen(mut self) -> Self {
                use $crate::binding::ParameterGroup;
                $(self.$field.each_mut().for_each(|p| p.freeze());)+
                self
            }

            /// All parameters, frozen or not
            pub fn parameters(&self) -> Vec<&simcv_core::Parameter> {
                use $crate::binding::ParameterGroup;
                let mut params = Vec::new();
                $(params.extend(self.$field.each());)+
                params
            }

            fn collect_trainable(&self) -> simcv_core::TrainableParameters {
                simcv_core::TrainableParameters::from_params(self.parameters())
            }
        }
    };
}
