//! Krylov solvers for the coupled-dipole equations.
//!
//! The solvers find the dipole polarizations `P` that satisfy
//! `(α⁻¹ - G) P = E_inc` on a cubic lattice. The interaction `G` is a
//! convolution, so the operator is applied with FFTs on a doubled grid
//! ([`FftMatVec`]) and never formed explicitly.
//!
//! # Architecture
//!
//! - [`LinearOperator`]: `y = A x` and `y = Aᴴ x` for the symmetrized system
//! - [`VectorBackend`]: where vectors and recurrence scalars live; the
//!   same solver code runs on [`CpuBackend`] or on a set of compute devices
//!   through [`DeviceBackend`]
//! - [`solvers`]: BiCG-CS, BiCGSTAB, CGNR and QMR-CS recurrences
//! - [`IterativeSolver`]: starting-vector selection, convergence control and
//!   profiling runs
//!
//! # Example
//!
//! ```
//! use dipola_core::{CoupleConstants, DdaParams, DipoleGeometry};
//! use dipola_solver::{CpuBackend, FftMatVec, IterativeSolver, SolverConfig, SolverKind};
//! use num_complex::Complex;
//! use std::sync::Arc;
//!
//! let params = Arc::new(DdaParams::new(DipoleGeometry::cuboid(2, 2, 2, 0.05), 1.0, 1, true).unwrap());
//! let backend = CpuBackend::new(Box::new(FftMatVec::<f64>::new(params.clone())));
//! let mut solver =
//!     IterativeSolver::new(params.clone(), backend, SolverConfig::new(SolverKind::QmrCs)).unwrap();
//! let cc = CoupleConstants::isotropic(&[Complex::new(0.01, 0.001)]);
//! solver.set_couple_constants(Arc::new(cc)).unwrap();
//!
//! let mut einc = vec![Complex::new(0.0, 0.0); params.vec_size()];
//! for i in 0..params.nv_count() {
//!     params.set(&mut einc, i, [Complex::new(1.0, 0.0), Complex::new(0.0, 0.0), Complex::new(0.0, 0.0)]);
//! }
//! let pol = solver.get_pol_vec(&einc, 1e-8, None, None).unwrap();
//! assert_eq!(pol.len(), params.vec_size());
//! ```

pub mod backend;
pub mod config;
pub mod cpu;
pub mod device;
pub mod dmatrix;
pub mod error;
pub mod fft;
pub mod iterative;
pub mod lincomb;
pub mod matvec;
pub mod operator;
pub mod profiling;
pub mod scalar;
pub mod solvers;

pub use backend::{Coeff, Reduction, ScalarExpr, ScalarSlot, VecId, VectorBackend};
pub use config::SolverConfig;
pub use cpu::CpuBackend;
pub use device::{ComputeDevice, DeviceBackend, DipVector, HostDevice};
pub use dmatrix::DMatrix;
pub use error::{Error, Result};
pub use iterative::{ConvergenceContext, IterativeSolver, StartChoice};
pub use matvec::FftMatVec;
pub use operator::{DenseOperator, LinearOperator, ScaledIdentity};
pub use profiling::{Profiler, ProfilingReport};
pub use scalar::{C, ExtComplex, ExtReal, Real};
pub use solvers::{Krylov, KrylovStep, SolverKind};
