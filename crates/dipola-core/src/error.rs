//! Error types for geometry and parameter construction.

use thiserror::Error;

/// Errors raised while building dipole geometries and simulation parameters.
#[derive(Debug, Error)]
pub enum Error {
    /// The geometry failed a consistency check.
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    /// A simulation parameter is out of range.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Dipoles must be sorted by z before the slab partition is built.
    #[error("Dipole positions are not sorted by z (index {index})")]
    UnsortedPositions { index: usize },

    /// A vector does not have the layout implied by the parameters.
    #[error("Vector length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// A material index has no coupling constant.
    #[error("Material index {index} out of range ({count} materials)")]
    MaterialOutOfRange { index: usize, count: usize },
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;
