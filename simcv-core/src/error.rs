//! Error types for simcv

use thiserror::Error;

/// Errors that can occur in continuous-variable state operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CvError {
    /// State constructed without exactly one complete representation, or
    /// with inconsistent modes/tensors
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Operation is not available for this representation
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Operand kinds cannot be combined this way
    #[error("Cannot apply {right} to {left}")]
    InvalidOperand { left: String, right: String },

    /// Singular matrix, non-positive determinant or non-finite result
    #[error("Numerical failure: {0}")]
    NumericalFailure(String),

    /// Dimension mismatch
    #[error("Dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    /// Mode label or index not present (or duplicated)
    #[error("Invalid mode {mode}: available modes are {available:?}")]
    InvalidMode { mode: usize, available: Vec<usize> },

    /// Parameter value outside its domain
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Invalid settings
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CvError {
    /// Create an invalid mode error
    pub fn invalid_mode(mode: usize, available: &[usize]) -> Self {
        Self::InvalidMode {
            mode,
            available: available.to_vec(),
        }
    }

    /// Create a dimension mismatch error
    pub fn dimension_mismatch(context: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch {
            context: context.into(),
            expected,
            actual,
        }
    }

    /// Create a numerical failure error
    pub fn numerical(message: impl Into<String>) -> Self {
        Self::NumericalFailure(message.into())
    }

    /// Create an invalid operand error naming both operand kinds
    pub fn invalid_operand(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self::InvalidOperand {
            left: left.into(),
            right: right.into(),
        }
    }
}

/// Result type for simcv operations
pub type Result<T> = std::result::Result<T, CvError>;
