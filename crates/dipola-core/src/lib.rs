//! Core data structures for Dipola.
//!
//! This crate provides the pieces of a discrete-dipole simulation that the
//! solver treats as read-only input:
//! - [`DipoleGeometry`]: dipoles on a cubic grid with material indices
//! - [`DdaParams`]: wavelength, FFT grid size and the padded vector layout,
//!   including the z-slab partition used for multi-device execution
//! - [`CoupleConstants`]: per-material diagonal polarizability tensors
//!
//! # Example
//!
//! ```
//! use dipola_core::{CoupleConstants, DdaParams, DipoleGeometry};
//!
//! let geometry = DipoleGeometry::cuboid(4, 4, 4, 0.1);
//! let params = DdaParams::new(geometry, 1.0, 1, true).unwrap();
//! assert_eq!(params.vec_size(), 3 * 64);
//!
//! let cc = CoupleConstants::<f64>::identity(params.geometry().mat_count());
//! assert_eq!(cc.mat_count(), 1);
//! ```

pub mod couple_constants;
pub mod error;
pub mod geometry;
pub mod params;
pub mod polarizability;

pub use couple_constants::{CoupleConstants, DiagMatrix3};
pub use error::{Error, Result};
pub use geometry::DipoleGeometry;
pub use params::{DdaParams, VEC_STRIDE_ALIGN, fft_fit, round_up};

/// Floating-point types usable for vectors and tensors.
pub trait FloatType:
    num_traits::Float + std::fmt::Debug + std::fmt::Display + Send + Sync + 'static
{
}

impl<T> FloatType for T where
    T: num_traits::Float + std::fmt::Debug + std::fmt::Display + Send + Sync + 'static
{
}
