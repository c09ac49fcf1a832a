//! Krylov recurrences.
//!
//! Each solver is a small struct holding the handles of its temporaries and
//! its recurrence scalars. [`IterativeSolver`](crate::iterative::IterativeSolver)
//! owns the control loop and calls [`KrylovStep::init`] once after the
//! starting residual is known, then [`KrylovStep::iteration`] until the
//! residual converges or a limit is hit.
//!
//! # Module Structure
//!
//! - [`bicg_cs`]: BiCG for complex-symmetric systems (unconjugated products)
//! - [`bicgstab`]: BiCG with a GMRES(1) stabilizing step
//! - [`cgnr`]: CG on the normal equations
//! - [`qmr_cs`]: QMR for complex-symmetric systems with Givens rotations

pub mod bicg_cs;
pub mod bicgstab;
pub mod cgnr;
pub mod qmr_cs;

pub use bicg_cs::BicgCs;
pub use bicgstab::BicgStab;
pub use cgnr::Cgnr;
pub use qmr_cs::QmrCs;

use crate::backend::{VecId, VectorBackend};
use crate::error::{Error, Result};
use crate::profiling::Profiler;
use crate::scalar::Real;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Available Krylov solvers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolverKind {
    BicgCs,
    BicgStab,
    Cgnr,
    #[default]
    QmrCs,
}

impl SolverKind {
    pub const ALL: [SolverKind; 4] = [
        SolverKind::BicgCs,
        SolverKind::BicgStab,
        SolverKind::Cgnr,
        SolverKind::QmrCs,
    ];

    /// Consecutive non-improving iterations tolerated before giving up.
    pub fn max_res_increase(self) -> usize {
        match self {
            SolverKind::BicgCs => 50_000,
            SolverKind::BicgStab => 30_000,
            SolverKind::Cgnr => 10,
            SolverKind::QmrCs => 50_000,
        }
    }

    /// Lowercase identifier used in configs and on the command line.
    pub fn id(self) -> &'static str {
        match self {
            SolverKind::BicgCs => "bicgcs",
            SolverKind::BicgStab => "bicgstab",
            SolverKind::Cgnr => "cgnr",
            SolverKind::QmrCs => "qmrcs",
        }
    }
}

impl fmt::Display for SolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SolverKind::BicgCs => "BiCG-CS",
            SolverKind::BicgStab => "BiCGSTAB",
            SolverKind::Cgnr => "CGNR",
            SolverKind::QmrCs => "QMR-CS",
        };
        f.write_str(name)
    }
}

impl FromStr for SolverKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let key: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match key.as_str() {
            "qmr" => return Ok(SolverKind::QmrCs),
            "bicg" => return Ok(SolverKind::BicgCs),
            _ => {}
        }
        SolverKind::ALL
            .into_iter()
            .find(|k| k.id() == key)
            .ok_or_else(|| Error::InvalidConfig(format!("unknown solver '{}'", s)))
    }
}

/// Vectors shared by every solver: residual, solution and operator output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommonVectors {
    pub r: VecId,
    pub x: VecId,
    pub av: VecId,
}

/// Everything one step may touch besides the solver's own state.
pub struct StepContext<'a, F: Real, B: VectorBackend<F>> {
    pub backend: &'a mut B,
    pub vecs: CommonVectors,
    /// Best squared residual norm so far.
    pub inprod_r: F,
    /// `1 / ‖b‖²`.
    pub resid_scale: F,
    /// Squared residual norm at which the solve stops.
    pub eps_b: F,
    pub prof: Option<&'a Profiler>,
}

/// One Krylov recurrence.
pub trait KrylovStep<F: Real> {
    fn kind(&self) -> SolverKind;

    /// One-time setup once `r` holds the starting residual.
    fn init<B: VectorBackend<F>>(&mut self, ctx: &mut StepContext<'_, F, B>) -> Result<()>;

    /// Advance `x` and `r` by one step and return `‖r‖²`.
    ///
    /// Breakdown guards are skipped when `profiling_run` is set.
    fn iteration<B: VectorBackend<F>>(
        &mut self,
        nr: usize,
        ctx: &mut StepContext<'_, F, B>,
        profiling_run: bool,
    ) -> Result<F>;
}

/// The four solvers as one closed type.
#[derive(Debug)]
pub enum Krylov<F: Real> {
    BicgCs(BicgCs),
    BicgStab(BicgStab<F>),
    Cgnr(Cgnr),
    QmrCs(QmrCs<F>),
}

impl<F: Real> Krylov<F> {
    /// Allocate the temporaries of `kind` on `backend`.
    pub fn new<B: VectorBackend<F>>(kind: SolverKind, backend: &mut B) -> Result<Self> {
        Ok(match kind {
            SolverKind::BicgCs => Krylov::BicgCs(BicgCs::new::<F, B>(backend)?),
            SolverKind::BicgStab => Krylov::BicgStab(BicgStab::new(backend)?),
            SolverKind::Cgnr => Krylov::Cgnr(Cgnr::new::<F, B>(backend)?),
            SolverKind::QmrCs => Krylov::QmrCs(QmrCs::new(backend)?),
        })
    }
}

impl<F: Real> KrylovStep<F> for Krylov<F> {
    fn kind(&self) -> SolverKind {
        match self {
            Krylov::BicgCs(_) => SolverKind::BicgCs,
            Krylov::BicgStab(_) => SolverKind::BicgStab,
            Krylov::Cgnr(_) => SolverKind::Cgnr,
            Krylov::QmrCs(_) => SolverKind::QmrCs,
        }
    }

    fn init<B: VectorBackend<F>>(&mut self, ctx: &mut StepContext<'_, F, B>) -> Result<()> {
        match self {
            Krylov::BicgCs(s) => KrylovStep::<F>::init(s, ctx),
            Krylov::BicgStab(s) => s.init(ctx),
            Krylov::Cgnr(s) => KrylovStep::<F>::init(s, ctx),
            Krylov::QmrCs(s) => s.init(ctx),
        }
    }

    fn iteration<B: VectorBackend<F>>(
        &mut self,
        nr: usize,
        ctx: &mut StepContext<'_, F, B>,
        profiling_run: bool,
    ) -> Result<F> {
        match self {
            Krylov::BicgCs(s) => s.iteration(nr, ctx, profiling_run),
            Krylov::BicgStab(s) => s.iteration(nr, ctx, profiling_run),
            Krylov::Cgnr(s) => s.iteration(nr, ctx, profiling_run),
            Krylov::QmrCs(s) => s.iteration(nr, ctx, profiling_run),
        }
    }
}

/// Breakdown error for a failed guard.
pub(crate) fn breakdown(solver: SolverKind, check: &'static str, value: f64) -> Error {
    log::warn!("{} breakdown: {} = {:e}", solver, check, value);
    Error::Breakdown {
        solver,
        check,
        value,
    }
}
