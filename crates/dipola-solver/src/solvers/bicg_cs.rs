//! Bi-Conjugate Gradient for complex-symmetric matrices.
//!
//! For `A = Aᵀ` the shadow sequence of BiCG equals the conjugate of the
//! primary one, so only one operator application per step is needed and
//! the inner products are taken without conjugation.

use super::{KrylovStep, SolverKind, StepContext, breakdown};
use crate::backend::{Coeff, Reduction, ScalarExpr, ScalarSlot, VecId, VectorBackend};
use crate::error::Result;
use crate::scalar::{ExtReal, Real};

/// Recurrence scalars; they stay where the backend keeps its scalars.
#[derive(Debug, Clone, Copy)]
struct Vars {
    ro_new: ScalarSlot,
    ro_old: ScalarSlot,
    mu: ScalarSlot,
    alpha: ScalarSlot,
    neg_alpha: ScalarSlot,
    beta: ScalarSlot,
    res: ScalarSlot,
}

#[derive(Debug)]
pub struct BicgCs {
    p: VecId,
    vars: Vars,
}

impl BicgCs {
    pub fn new<F: Real, B: VectorBackend<F>>(backend: &mut B) -> Result<Self> {
        Ok(Self {
            p: backend.alloc_vector("bicgcs.p")?,
            vars: Vars {
                ro_new: backend.alloc_scalar("bicgcs.ro_new")?,
                ro_old: backend.alloc_scalar("bicgcs.ro_old")?,
                mu: backend.alloc_scalar("bicgcs.mu")?,
                alpha: backend.alloc_scalar("bicgcs.alpha")?,
                neg_alpha: backend.alloc_scalar("bicgcs.neg_alpha")?,
                beta: backend.alloc_scalar("bicgcs.beta")?,
                res: backend.alloc_scalar("bicgcs.res")?,
            },
        })
    }
}

impl<F: Real> KrylovStep<F> for BicgCs {
    fn kind(&self) -> SolverKind {
        SolverKind::BicgCs
    }

    fn init<B: VectorBackend<F>>(&mut self, _ctx: &mut StepContext<'_, F, B>) -> Result<()> {
        Ok(())
    }

    fn iteration<B: VectorBackend<F>>(
        &mut self,
        nr: usize,
        ctx: &mut StepContext<'_, F, B>,
        profiling_run: bool,
    ) -> Result<F> {
        let v = self.vars;
        let p = self.p;
        let r = ctx.vecs.r;
        let x = ctx.vecs.x;
        let av = ctx.vecs.av;
        let b = &mut *ctx.backend;

        // ro = r·r
        b.reduce(Reduction::DotUnconj(r, r), v.ro_new)?;
        let mut abs_ro = ExtReal::new(0.0);
        if !profiling_run {
            abs_ro = ExtReal::from_real(b.read_scalar(v.ro_new)?.norm());
            let dtmp = (abs_ro / ExtReal::from_real(ctx.inprod_r)).to_f64();
            // NaN passes
            if dtmp < 1e-10 || dtmp > 1e10 {
                return Err(breakdown(SolverKind::BicgCs, "|rho|/|r|^2", dtmp));
            }
        }

        if nr == 0 {
            b.copy(r, p)?;
        } else {
            b.eval(v.beta, ScalarExpr::Div(v.ro_new, v.ro_old))?;
            b.lin_comb(p, &[(p, Coeff::Slot(v.beta)), (r, Coeff::one())])?;
        }

        b.apply(p, av, false, ctx.prof)?;

        // mu = p·Ap
        b.reduce(Reduction::DotUnconj(p, av), v.mu)?;
        if !profiling_run {
            let abs_mu = ExtReal::from_real(b.read_scalar(v.mu)?.norm());
            let dtmp = (abs_mu / abs_ro).to_f64();
            if dtmp < 10e-10 {
                return Err(breakdown(SolverKind::BicgCs, "|mu|/|rho|", dtmp));
            }
        }

        b.eval(v.alpha, ScalarExpr::Div(v.ro_new, v.mu))?;
        b.eval(v.neg_alpha, ScalarExpr::Neg(v.alpha))?;
        b.lin_comb(x, &[(p, Coeff::Slot(v.alpha)), (x, Coeff::one())])?;
        b.lin_comb(r, &[(av, Coeff::Slot(v.neg_alpha)), (r, Coeff::one())])?;
        b.eval(v.ro_old, ScalarExpr::Copy(v.ro_new))?;

        Ok(b.reduce_read(Reduction::Norm(r), v.res)?.re)
    }
}
