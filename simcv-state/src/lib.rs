//! Continuous-variable quantum states in Gaussian and Fock representations
//!
//! This crate provides the state engine of simcv:
//! - [`gaussian`]: channel application, partitions, dyne measurement,
//!   composition and photon-number moments on covariance matrices
//! - [`fock`]: Gaussian→Fock conversion through the renormalized Hermite
//!   recurrence, partial traces, contractions and cutoff selection
//! - [`State`]: one native representation with the other one computed
//!   lazily and cached
//! - [`Transformation`]: Gaussian channels `(X, Y, d)` applied to states
//!
//! # Representations
//!
//! - **Gaussian**: covariance and means in xxpp ordering; cheap channel
//!   application and exact measurement
//! - **Fock**: ket or density matrix truncated at per-mode cutoffs; used for
//!   non-Gaussian states and whenever Gaussian math does not apply
//!
//! # Example
//!
//! ```
//! use simcv_state::{preparations, Context, Operand};
//!
//! let ctx = Context::default();
//! let tmsv = preparations::two_mode_squeezed_vacuum(&ctx, 0.5, 0.0).unwrap();
//! let vacuum = preparations::vacuum(&ctx, 1).unwrap();
//!
//! // Measure mode 0 with the vacuum; mode 1 is left in vacuum
//! let projected = vacuum.primal(Operand::from(&tmsv)).unwrap();
//! let remaining = projected.into_state().unwrap();
//! assert!(remaining.norm() < 1.0);
//! ```

pub mod context;
pub mod fock;
pub mod gaussian;
pub mod preparations;
pub mod state;
pub mod transformation;
pub mod validation;

pub use context::Context;
pub use fock::{Contracted, FockTensor};
pub use gaussian::{DualChannel, DyneOutcome};
pub use state::{Advisory, Operand, Projection, Representation, State, StateBuilder};
pub use transformation::Transformation;
