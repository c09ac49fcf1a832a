//! Convergence control loop.
//!
//! [`IterativeSolver`] turns an incident field into the polarization of
//! every dipole. It works on the symmetrized system
//! `(I + S D S) y = S e` with `S = cc_sqrt`, picks the cheapest of the
//! available starting vectors, drives one [`Krylov`] recurrence until
//! `‖r‖² < eps²·‖S e‖²`, and returns `S y`.

use crate::backend::{Coeff, Reduction, ScalarSlot, VectorBackend};
use crate::config::SolverConfig;
use crate::error::{Error, Result};
use crate::profiling::{ProfilingReport, Profiler, format_duration, span};
use crate::scalar::{C, Real, czero};
use crate::solvers::{CommonVectors, Krylov, KrylovStep, SolverKind, StepContext};
use dipola_core::{CoupleConstants, DdaParams};
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Iteration index passed to the warm-up step of a profiling run.
const PROFILING_FIRST_ITERATION: usize = 10;
/// Timed steps of a profiling run.
const PROFILING_SAMPLES: usize = 5;

/// Starting vector chosen for a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartChoice {
    /// `x = 0`, `r = b`.
    #[default]
    Zero,
    /// `x = b`, `r = b - A b`.
    Rhs,
    /// `x = S⁻¹ x₀` for a caller-supplied polarization `x₀`.
    WarmStart,
}

/// Residual history of the current (or last) solve.
#[derive(Debug, Clone)]
pub struct ConvergenceContext<F: Real> {
    /// Best squared residual so far; never increases during a solve.
    pub inprod_r: F,
    pub inprod_r_init: F,
    /// Every squared residual returned by the recurrence, in order.
    pub history: Vec<F>,
    /// Consecutive iterations without improving `inprod_r`.
    pub counter: usize,
    pub iterations: usize,
    pub resid_scale: F,
    pub eps_b: F,
    pub start_choice: StartChoice,
    pub started: Option<Instant>,
}

impl<F: Real> Default for ConvergenceContext<F> {
    fn default() -> Self {
        Self {
            inprod_r: F::zero(),
            inprod_r_init: F::zero(),
            history: Vec::new(),
            counter: 0,
            iterations: 0,
            resid_scale: F::one(),
            eps_b: F::zero(),
            start_choice: StartChoice::Zero,
            started: None,
        }
    }
}

impl<F: Real> ConvergenceContext<F> {
    pub fn new(inprod_r: F, resid_scale: F, eps_b: F, start_choice: StartChoice) -> Self {
        Self {
            inprod_r,
            inprod_r_init: inprod_r,
            resid_scale,
            eps_b,
            start_choice,
            started: Some(Instant::now()),
            ..Default::default()
        }
    }

    /// Account for one iteration that produced `res`.
    pub fn record(&mut self, res: F) {
        if res <= self.inprod_r {
            self.inprod_r = res;
            self.counter = 0;
        } else {
            self.counter += 1;
        }
        self.history.push(res);
        self.iterations += 1;
    }

    pub fn converged(&self) -> bool {
        !(self.inprod_r >= self.eps_b)
    }

    /// Relative error `sqrt(resid_scale · res)`.
    pub fn relative_error(&self, res: F) -> f64 {
        (self.resid_scale.as_f64() * res.as_f64()).sqrt()
    }

    /// Fraction of the way from the initial to the target residual on a
    /// log scale.
    pub fn progress(&self) -> f64 {
        let init = self.inprod_r_init.as_f64().ln();
        (self.inprod_r.as_f64().ln() - init) / (self.eps_b.as_f64().ln() - init)
    }

    /// Remaining time extrapolated from `elapsed`, if it is finite.
    pub fn eta(&self, elapsed: Duration) -> Option<Duration> {
        let prog = self.progress();
        Duration::try_from_secs_f64(elapsed.as_secs_f64() * (1.0 - prog) / prog).ok()
    }

    /// Progress line for the latest iteration.
    fn progress_line(&self, err: f64, prev_err: f64) -> String {
        let trend = if self.counter == 0 {
            "+ "
        } else if 1.0 - err / prev_err > 0.0 {
            "-+"
        } else {
            "- "
        };
        let remain = self
            .started
            .and_then(|t| self.eta(t.elapsed()))
            .map(format_duration)
            .unwrap_or_else(|| "?".to_string());
        format!(
            "RE_{:05} = {:12.6e}  {}  [{:6.2}%]  [{:>12}]",
            self.iterations,
            err,
            trend,
            self.progress() * 100.0,
            remain
        )
    }
}

/// Krylov solve of the coupled-dipole system on one backend.
pub struct IterativeSolver<F: Real, B: VectorBackend<F>> {
    params: Arc<DdaParams>,
    backend: B,
    config: SolverConfig,
    krylov: Krylov<F>,
    vecs: CommonVectors,
    tmp: ScalarSlot,
    cc: Option<Arc<CoupleConstants<F>>>,
    convergence: ConvergenceContext<F>,
}

impl<F: Real, B: VectorBackend<F>> IterativeSolver<F, B> {
    /// Allocate the common vectors and the temporaries of `config.kind`.
    pub fn new(params: Arc<DdaParams>, mut backend: B, config: SolverConfig) -> Result<Self> {
        if backend.vec_size() != params.vec_size() {
            return Err(Error::DimensionMismatch {
                expected: params.vec_size(),
                actual: backend.vec_size(),
            });
        }
        let vecs = CommonVectors {
            r: backend.alloc_vector("rvec")?,
            x: backend.alloc_vector("xvec")?,
            av: backend.alloc_vector("avec")?,
        };
        let tmp = backend.alloc_scalar("solver.tmp")?;
        let krylov = Krylov::<F>::new(config.kind, &mut backend)?;
        log::info!(
            "{} solver on {} backend ({} dipoles, {} precision)",
            config.kind,
            backend.name(),
            params.nv_count(),
            F::NAME
        );
        Ok(Self {
            params,
            backend,
            config,
            krylov,
            vecs,
            tmp,
            cc: None,
            convergence: ConvergenceContext::default(),
        })
    }

    pub fn kind(&self) -> SolverKind {
        self.krylov.kind()
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn params(&self) -> &Arc<DdaParams> {
        &self.params
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Residual history of the last solve.
    pub fn convergence(&self) -> &ConvergenceContext<F> {
        &self.convergence
    }

    /// Bind coupling constants; required before the first solve.
    pub fn set_couple_constants(&mut self, cc: Arc<CoupleConstants<F>>) -> Result<()> {
        cc.check_materials(self.params.geometry().mat_count())?;
        self.backend.set_couple_constants(cc.clone())?;
        self.cc = Some(cc);
        Ok(())
    }

    /// Solve for the dipole polarizations induced by `einc`.
    ///
    /// Stops once the relative residual drops below `eps`. `start` is an
    /// optional polarization from an earlier solve; it is only used when it
    /// beats the zero vector.
    pub fn get_pol_vec(
        &mut self,
        einc: &[C<F>],
        eps: F,
        start: Option<&[C<F>]>,
        prof: Option<&Profiler>,
    ) -> Result<Vec<C<F>>> {
        let cc = self.cc.clone().ok_or(Error::MissingCoupleConstants)?;
        self.params.check_len(einc.len())?;
        if let Some(s) = start {
            self.params.check_len(s.len())?;
        }

        let Some((inprod_r, resid_scale, choice)) = self.init_general(&cc, einc, start, prof)?
        else {
            log::warn!("Incident field is zero, returning zero polarization");
            self.convergence = ConvergenceContext::default();
            return Ok(vec![czero(); self.params.vec_size()]);
        };
        let eps_b = eps * eps / resid_scale;
        log::info!(
            "{}: start from {:?}, inprod_r = {:e}, eps_b = {:e}",
            self.config.kind,
            choice,
            inprod_r,
            eps_b
        );

        let max_iter = self.config.effective_max_iter();
        let max_res_increase = self.config.effective_max_res_increase();
        let progress = self.config.progress;
        self.convergence = ConvergenceContext::new(inprod_r, resid_scale, eps_b, choice);
        let conv = &mut self.convergence;
        let mut prev_err = conv.relative_error(inprod_r);

        {
            let _p = span(prof, "itsolv");
            let mut ctx = StepContext {
                backend: &mut self.backend,
                vecs: self.vecs,
                inprod_r,
                resid_scale,
                eps_b,
                prof,
            };
            self.krylov.init(&mut ctx)?;
            while conv.inprod_r >= eps_b {
                if conv.iterations >= max_iter {
                    return Err(Error::TooManyIterations { limit: max_iter });
                } else if conv.counter > max_res_increase {
                    return Err(Error::NoImprovement {
                        limit: max_res_increase,
                    });
                }
                ctx.inprod_r = conv.inprod_r;
                let res = self.krylov.iteration(conv.iterations, &mut ctx, false)?;
                conv.record(res);

                let err = conv.relative_error(res);
                let line = conv.progress_line(err, prev_err);
                if progress {
                    eprint!("{}\r", line);
                }
                log::debug!("{}", line);
                prev_err = err;
            }
            if progress {
                eprintln!();
            }
        }
        log::info!(
            "{} converged after {} iterations (relative error {:e})",
            self.config.kind,
            conv.iterations,
            conv.relative_error(conv.inprod_r)
        );

        self.get_result(&cc, prof)
    }

    /// Set up `x` and `r` and return `(‖r‖², 1/‖b‖², choice)`, or `None`
    /// when the right-hand side is zero.
    ///
    /// A warm start must beat the zero vector strictly. Between the
    /// right-hand side and zero, zero is only taken when it is strictly
    /// better, so a tie keeps `x = b`.
    fn init_general(
        &mut self,
        cc: &CoupleConstants<F>,
        einc: &[C<F>],
        start: Option<&[C<F>]>,
        prof: Option<&Profiler>,
    ) -> Result<Option<(F, F, StartChoice)>> {
        let _p = span(prof, "init");
        let CommonVectors { r, x, av } = self.vecs;
        let b = &mut self.backend;

        let mut rhs = vec![czero(); self.params.vec_size()];
        self.params.mult_mat(cc.cc_sqrt_all(), einc, &mut rhs)?;
        b.upload(r, &rhs)?;
        let zero_res = b.reduce_read(Reduction::Norm(r), self.tmp)?.re;
        if zero_res == F::zero() {
            b.zero(x)?;
            return Ok(None);
        }
        let resid_scale = F::one() / zero_res;

        if let Some(start) = start {
            let mut x0 = vec![czero(); self.params.vec_size()];
            self.params.mult_mat_inv(cc.cc_sqrt_all(), start, &mut x0)?;
            b.upload(x, &x0)?;
            b.apply(x, av, false, prof)?;
            b.lin_comb(r, &[(av, Coeff::minus_one()), (r, Coeff::one())])?;
            let warm_res = b.reduce_read(Reduction::Norm(r), self.tmp)?.re;
            log::debug!("warm start residual {:e}, zero start {:e}", warm_res, zero_res);
            if warm_res < zero_res {
                return Ok(Some((warm_res, resid_scale, StartChoice::WarmStart)));
            }
            b.upload(r, &rhs)?;
        }

        b.upload(x, &rhs)?;
        b.apply(x, av, false, prof)?;
        b.lin_comb(r, &[(av, Coeff::minus_one()), (r, Coeff::one())])?;
        let rhs_res = b.reduce_read(Reduction::Norm(r), self.tmp)?.re;
        if rhs_res <= zero_res {
            Ok(Some((rhs_res, resid_scale, StartChoice::Rhs)))
        } else {
            b.zero(x)?;
            b.upload(r, &rhs)?;
            Ok(Some((zero_res, resid_scale, StartChoice::Zero)))
        }
    }

    /// Polarization `S x` from the symmetrized solution.
    fn get_result(&mut self, cc: &CoupleConstants<F>, prof: Option<&Profiler>) -> Result<Vec<C<F>>> {
        let _p = span(prof, "result");
        let x = self.backend.download(self.vecs.x)?;
        let mut out = vec![czero(); self.params.vec_size()];
        self.params.mult_mat(cc.cc_sqrt_all(), &x, &mut out)?;
        Ok(out)
    }

    /// Time steady-state iterations without convergence checks.
    ///
    /// Runs one warm-up iteration and then times five more; breakdown
    /// guards are disabled, so the vectors may hold garbage afterwards.
    pub fn profiling_run<W: Write>(
        &mut self,
        out: &mut W,
        prof: Option<&Profiler>,
    ) -> Result<ProfilingReport> {
        if self.cc.is_none() {
            return Err(Error::MissingCoupleConstants);
        }
        let conv = &self.convergence;
        let mut ctx = StepContext {
            backend: &mut self.backend,
            vecs: self.vecs,
            inprod_r: conv.inprod_r,
            resid_scale: conv.resid_scale,
            eps_b: F::one(),
            prof,
        };

        {
            let _p = span(prof, "itsolv1");
            self.krylov
                .iteration(PROFILING_FIRST_ITERATION - 1, &mut ctx, true)?;
        }

        let mut samples = Vec::with_capacity(PROFILING_SAMPLES);
        {
            let _p = span(prof, "itsolv2");
            for i in 0..PROFILING_SAMPLES {
                let start = Instant::now();
                self.krylov
                    .iteration(PROFILING_FIRST_ITERATION + i, &mut ctx, true)?;
                samples.push((i, start.elapsed()));
            }
        }

        let report = ProfilingReport::from_samples(samples)
            .ok_or_else(|| Error::InvalidConfig("no profiling samples".to_string()))?;
        write!(out, "{}", report)?;
        log::info!(
            "{} profiling run: {} +- {} per iteration",
            self.config.kind,
            format_duration(report.median),
            format_duration(report.spread)
        );
        Ok(report)
    }

    /// Download the current solution estimate (symmetrized, padded layout).
    pub fn solution(&mut self) -> Result<Vec<C<F>>> {
        self.backend.download(self.vecs.x)
    }

    /// Download the current residual (padded layout).
    pub fn residual(&mut self) -> Result<Vec<C<F>>> {
        self.backend.download(self.vecs.r)
    }
}
