//! Error types for the solver crate.

use crate::solvers::SolverKind;
use thiserror::Error;

/// Errors that abort a solve.
///
/// None of these are recoverable within the solve that raised them; the
/// caller may retry with another solver or starting vector.
#[derive(Debug, Error)]
pub enum Error {
    /// A recurrence ratio left its numerically safe range.
    #[error("{solver} breakdown: {check} = {value:e}")]
    Breakdown {
        solver: SolverKind,
        check: &'static str,
        value: f64,
    },

    /// The iteration cap was exceeded.
    #[error("Too many iterations (limit {limit})")]
    TooManyIterations { limit: usize },

    /// The residual failed to improve too many times in a row.
    #[error("Too many iterations w/o increase (limit {limit})")]
    NoImprovement { limit: usize },

    /// `get_pol_vec` was called before coupling constants were set.
    #[error("Coupling constants have not been set")]
    MissingCoupleConstants,

    /// A vector has the wrong length.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Invalid solver configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Compute device failure.
    #[error("Device error: {0}")]
    Device(String),

    /// I/O failure while writing reports.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from the core crate.
    #[error(transparent)]
    Core(#[from] dipola_core::Error),
}

/// Result type for solver operations.
pub type Result<T> = std::result::Result<T, Error>;
