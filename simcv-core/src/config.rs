//! Numerical settings shared by the engines

use crate::{CvError, Result};
use serde::{Deserialize, Serialize};

/// Policy for choosing Fock cutoffs from photon-number moments
///
/// Each mode gets `ceil(mean + stdev_factor * stdev) + 1` dimensions, clipped to
/// `[min_cutoff, max_cutoff]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AutocutoffPolicy {
    /// Number of photon-number standard deviations kept above the mean
    ///
    /// Default: 5.0
    pub stdev_factor: f64,

    /// Smallest cutoff ever returned
    ///
    /// Default: 1
    pub min_cutoff: usize,

    /// Largest cutoff ever returned
    ///
    /// Default: 100
    pub max_cutoff: usize,
}

impl Default for AutocutoffPolicy {
    fn default() -> Self {
        Self {
            stdev_factor: 5.0,
            min_cutoff: 1,
            max_cutoff: 100,
        }
    }
}

/// Process-wide numerical settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Phase-space quadrature scale: vacuum covariance is `hbar/2 * I`
    ///
    /// Default: 2.0
    pub hbar: f64,

    /// Absolute tolerance used by purity and equality checks
    ///
    /// Default: 1e-6
    pub tolerance: f64,

    /// Include covariance and means in state summaries
    ///
    /// Only affects diagnostic output, never computed results.
    ///
    /// Default: false
    pub debug: bool,

    /// Automatic cutoff selection policy
    pub autocutoff: AutocutoffPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            hbar: 2.0,
            tolerance: 1e-6,
            debug: false,
            autocutoff: AutocutoffPolicy::default(),
        }
    }
}

impl Settings {
    /// Create settings with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings for diagnostics: debug output enabled
    pub fn debug() -> Self {
        Self {
            debug: true,
            ..Default::default()
        }
    }

    /// Set hbar
    pub fn with_hbar(mut self, hbar: f64) -> Self {
        self.hbar = hbar;
        self
    }

    /// Set the comparison tolerance
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the autocutoff policy
    pub fn with_autocutoff(mut self, policy: AutocutoffPolicy) -> Self {
        self.autocutoff = policy;
        self
    }

    /// Enable or disable debug output
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        if !self.hbar.is_finite() || self.hbar <= 0.0 {
            return Err(CvError::InvalidConfig(format!(
                "hbar must be positive and finite, got {}",
                self.hbar
            )));
        }

        if !(self.tolerance > 0.0 && self.tolerance < 1.0) {
            return Err(CvError::InvalidConfig(format!(
                "tolerance must be in (0, 1), got {}",
                self.tolerance
            )));
        }

        let policy = &self.autocutoff;
        if policy.min_cutoff == 0 || policy.min_cutoff > policy.max_cutoff {
            return Err(CvError::InvalidConfig(format!(
                "autocutoff bounds must satisfy 1 <= min ({}) <= max ({})",
                policy.min_cutoff, policy.max_cutoff
            )));
        }

        if !policy.stdev_factor.is_finite() || policy.stdev_factor < 0.0 {
            return Err(CvError::InvalidConfig(format!(
                "autocutoff stdev factor must be non-negative, got {}",
                policy.stdev_factor
            )));
        }

        Ok(())
    }
}
