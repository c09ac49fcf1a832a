//! Solve and profile runners.

use crate::backend::{DevicePrecision, create_devices};
use crate::config::{Precision, ProblemArgs};
use crate::output::{
    RunReport, SolutionRecord, load_warm_start, pack_polarization, unpack_polarization,
    write_report,
};
use anyhow::{Context, Result};
use clap::Args;
use dipola_core::polarizability::clausius_mossotti;
use dipola_core::{CoupleConstants, DdaParams};
use dipola_solver::{
    C, CpuBackend, DeviceBackend, FftMatVec, IterativeSolver, Profiler, ProfilingReport, Real,
    VectorBackend,
};
use num_complex::Complex;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Args)]
pub struct SolveArgs {
    #[command(flatten)]
    pub problem: ProblemArgs,

    /// Start from the polarizations in a previous JSON report
    #[arg(long)]
    pub start: Option<PathBuf>,

    /// Write the JSON report here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct ProfileArgs {
    #[command(flatten)]
    pub problem: ProblemArgs,
}

/// Incident polarization directions.
const INCIDENT: [(&str, usize); 2] = [("x", 0), ("y", 1)];

/// Plane wave travelling along z, polarized along axis `dir`.
fn plane_wave<F: Real>(params: &DdaParams, dir: usize) -> Vec<C<F>> {
    let zero = Complex::new(F::zero(), F::zero());
    let mut einc = vec![zero; params.vec_size()];
    for (i, pos) in params.geometry().positions().iter().enumerate() {
        let phase = Complex::from_polar(1.0, params.kd() * pos.z as f64);
        let mut e = [zero; 3];
        e[dir] = Complex::new(F::lit(phase.re), F::lit(phase.im));
        params.set(&mut einc, i, e);
    }
    einc
}

fn couple_constants<F: Real>(
    problem: &ProblemArgs,
    params: &DdaParams,
) -> Result<Arc<CoupleConstants<F>>> {
    let alpha = clausius_mossotti(problem.refractive_index()?, params.kd());
    log::info!("Coupling constant {:.6e}", alpha);
    Ok(Arc::new(CoupleConstants::isotropic(&[alpha]).cast::<F>()))
}

pub fn run_solve(args: &SolveArgs) -> Result<()> {
    match args.problem.precision {
        Precision::F32 => solve::<f32>(args),
        Precision::F64 => solve::<f64>(args),
    }
}

pub fn run_profile(args: &ProfileArgs) -> Result<()> {
    let prof = Profiler::new();
    let mut stdout = std::io::stdout().lock();
    match args.problem.precision {
        Precision::F32 => profile::<f32>(&args.problem, &mut stdout, &prof)?,
        Precision::F64 => profile::<f64>(&args.problem, &mut stdout, &prof)?,
    };
    writeln!(stdout)?;
    write!(stdout, "{}", prof.report())?;
    Ok(())
}

/// Run `f` on a solver for `problem`, on the backend it selects.
fn with_solver<F, T>(
    problem: &ProblemArgs,
    params: &Arc<DdaParams>,
    f: impl FnOnce(&mut dyn SolveSession<F>) -> Result<T>,
) -> Result<T>
where
    F: DevicePrecision,
{
    let config = problem.solver_config()?;
    let cc = couple_constants::<F>(problem, params)?;
    let operator = Box::new(FftMatVec::<F>::new(params.clone()));
    log::info!(
        "{} dipoles, grid {:?}, solver {}, {} precision",
        params.nv_count(),
        params.grid_size(),
        config.kind,
        F::NAME
    );
    match create_devices::<F>(problem.backend, params.procs())? {
        None => {
            let mut solver =
                IterativeSolver::new(params.clone(), CpuBackend::new(operator), config)?;
            solver.set_couple_constants(cc)?;
            f(&mut solver)
        }
        Some(devices) => {
            let backend = DeviceBackend::new(params.clone(), devices, operator)?;
            let mut solver = IterativeSolver::new(params.clone(), backend, config)?;
            solver.set_couple_constants(cc)?;
            f(&mut solver)
        }
    }
}

/// Backend-erased view of an [`IterativeSolver`].
trait SolveSession<F: Real> {
    fn solve(&mut self, einc: &[C<F>], eps: F, start: Option<&[C<F>]>, prof: &Profiler)
        -> Result<SolveOutcome<F>>;

    fn profile(&mut self, out: &mut dyn Write, prof: &Profiler) -> Result<ProfilingReport>;
}

struct SolveOutcome<F: Real> {
    pol: Vec<C<F>>,
    iterations: usize,
    start: String,
    relative_error: f64,
    history: Vec<f64>,
}

impl<F: Real, B: VectorBackend<F>> SolveSession<F> for IterativeSolver<F, B> {
    fn solve(
        &mut self,
        einc: &[C<F>],
        eps: F,
        start: Option<&[C<F>]>,
        prof: &Profiler,
    ) -> Result<SolveOutcome<F>> {
        let pol = self.get_pol_vec(einc, eps, start, Some(prof))?;
        let conv = self.convergence();
        Ok(SolveOutcome {
            pol,
            iterations: conv.iterations,
            start: format!("{:?}", conv.start_choice).to_lowercase(),
            relative_error: conv.relative_error(conv.inprod_r),
            history: conv
                .history
                .iter()
                .map(|&r| conv.relative_error(r))
                .collect(),
        })
    }

    fn profile(&mut self, mut out: &mut dyn Write, prof: &Profiler) -> Result<ProfilingReport> {
        Ok(self.profiling_run(&mut out, Some(prof))?)
    }
}

fn solve<F: DevicePrecision>(args: &SolveArgs) -> Result<()> {
    let problem = &args.problem;
    let params = Arc::new(problem.params()?);
    let warm = match &args.start {
        Some(path) => load_warm_start(path)?,
        None => Vec::new(),
    };
    let eps = problem.epsilon();
    let incident = if problem.both_pol {
        &INCIDENT[..]
    } else {
        &INCIDENT[..1]
    };

    let prof = Profiler::new();
    let solutions = with_solver::<F, _>(problem, &params, |session| {
        let mut solutions = Vec::with_capacity(incident.len());
        for &(name, dir) in incident {
            let einc = plane_wave::<F>(&params, dir);
            let start = warm
                .iter()
                .find(|r| r.incident == name)
                .map(|r| unpack_polarization::<F>(&params, &r.polarization))
                .transpose()?;

            let t0 = Instant::now();
            let outcome = session
                .solve(&einc, F::lit(eps), start.as_deref(), &prof)
                .with_context(|| format!("solving for {}-polarized incidence", name))?;
            let elapsed = t0.elapsed();
            log::info!(
                "{}-polarized: {} iterations, relative error {:.3e}, start {}, {:.3}s",
                name,
                outcome.iterations,
                outcome.relative_error,
                outcome.start,
                elapsed.as_secs_f64()
            );
            solutions.push(SolutionRecord {
                incident: name.to_string(),
                iterations: outcome.iterations,
                start: outcome.start,
                relative_error: outcome.relative_error,
                elapsed_s: elapsed.as_secs_f64(),
                history: outcome.history,
                polarization: pack_polarization(&params, &outcome.pol),
            });
        }
        Ok(solutions)
    })?;
    log::debug!("Timers:\n{}", prof.report());

    let m = problem.refractive_index()?;
    let report = RunReport {
        solver: problem.solver_config()?.kind,
        backend: problem.backend,
        precision: problem.precision,
        shape: problem.shape,
        nv_count: params.nv_count(),
        lambda: params.lambda(),
        grid_unit: params.grid_unit(),
        refractive_index: [m.re, m.im],
        epsilon: eps,
        solutions,
    };
    write_report(&report, args.output.as_deref())
}

/// Time steady-state iterations on a solver that only has its coupling
/// constants set.
fn profile<F: DevicePrecision>(
    problem: &ProblemArgs,
    out: &mut dyn Write,
    prof: &Profiler,
) -> Result<ProfilingReport> {
    let params = Arc::new(problem.params()?);
    with_solver::<F, _>(problem, &params, |session| session.profile(out, prof))
}
