//! Core types for simcv, a continuous-variable quantum state simulator
//!
//! This crate provides the pieces shared by every other simcv crate:
//! - [`CvError`]: the error kinds raised by the engines and the state algebra
//! - [`Settings`]: `hbar`, tolerance, debug flag and autocutoff policy
//! - [`Parameter`]: transformation parameters grouped by geometry
//!
//! # Example
//! ```
//! use simcv_core::Settings;
//!
//! let settings = Settings::new().with_hbar(1.0);
//! assert!(settings.validate().is_ok());
//! ```

pub mod config;
pub mod error;
pub mod parameter;

pub use config::{AutocutoffPolicy, Settings};
pub use error::{CvError, Result};
pub use parameter::{Parameter, ParameterKind, ParameterValue, TrainableParameters};
