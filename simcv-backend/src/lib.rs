//! Numeric backends for simcv
//!
//! This crate provides the linear-algebra and special-function layer the
//! Gaussian and Fock engines are written against:
//! - [`NumericBackend`]: the backend contract (inverse, determinant, matrix
//!   exponential, Hermitian eigendecomposition, renormalized Hermite tensor)
//! - [`NativeBackend`]: CPU implementation on nalgebra, ndarray and rayon
//! - [`hermite`]: the renormalized multidimensional Hermite recurrence and
//!   its gradient rule
//!
//! # Architecture
//!
//! Engines receive a `&dyn NumericBackend` explicitly instead of consulting a
//! process-wide singleton, so different states can be evaluated with
//! different backends side by side.

pub mod backend;
pub mod hermite;
pub mod native;

pub use backend::{HermiteGradient, NumericBackend};
pub use native::NativeBackend;
