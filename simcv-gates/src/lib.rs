//! Standard Gaussian gates and channels for simcv
//!
//! Every operation implements [`simcv_state::Transformation`] and can be
//! applied with `&state >> &gate`.
//!
//! # Example
//! ```
//! use simcv_gates::{Dgate, Sgate};
//! use simcv_state::{preparations, Context};
//!
//! let ctx = Context::default();
//! let vacuum = preparations::vacuum(&ctx, 2).unwrap();
//! let squeezed = (&vacuum >> &Sgate::new(&[0.5], &[0.0]).unwrap().on(&[1]).unwrap()).unwrap();
//! let displaced = (&squeezed >> &Dgate::new(&[1.0, 0.0], &[0.0, 0.0]).unwrap()).unwrap();
//! assert!(displaced.is_pure().unwrap());
//! ```

#[macro_use]
mod binding;

pub mod channels;
pub mod standard;
pub mod symplectic;

pub use channels::{AdditiveNoise, Amplifier, Attenuator};
pub use standard::{BSgate, Dgate, Ggate, RealInterferometer, Rgate, S2gate, Sgate};
