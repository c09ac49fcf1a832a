//! Conjugate Gradient on the normal equations `AᴴA x = Aᴴ b`.
//!
//! Two operator applications per step and no breakdown guards; stagnation
//! is caught by the control loop's short no-improvement limit. Every scalar
//! stays in the backend's record, so the only blocking read per step is the
//! final residual norm.

use super::{KrylovStep, SolverKind, StepContext};
use crate::backend::{Coeff, Reduction, ScalarExpr, ScalarSlot, VecId, VectorBackend};
use crate::error::Result;
use crate::profiling::span;
use crate::scalar::{Real, czero};

#[derive(Debug, Clone, Copy)]
struct Vars {
    ro_new: ScalarSlot,
    ro_old: ScalarSlot,
    beta: ScalarSlot,
    ap_norm: ScalarSlot,
    alpha: ScalarSlot,
    neg_alpha: ScalarSlot,
    res: ScalarSlot,
}

#[derive(Debug)]
pub struct Cgnr {
    p: VecId,
    vars: Vars,
}

impl Cgnr {
    pub fn new<F: Real, B: VectorBackend<F>>(backend: &mut B) -> Result<Self> {
        Ok(Self {
            p: backend.alloc_vector("cgnr.p")?,
            vars: Vars {
                ro_new: backend.alloc_scalar("cgnr.ro_new")?,
                ro_old: backend.alloc_scalar("cgnr.ro_old")?,
                beta: backend.alloc_scalar("cgnr.beta")?,
                ap_norm: backend.alloc_scalar("cgnr.ap_norm")?,
                alpha: backend.alloc_scalar("cgnr.alpha")?,
                neg_alpha: backend.alloc_scalar("cgnr.neg_alpha")?,
                res: backend.alloc_scalar("cgnr.res")?,
            },
        })
    }
}

impl<F: Real> KrylovStep<F> for Cgnr {
    fn kind(&self) -> SolverKind {
        SolverKind::Cgnr
    }

    fn init<B: VectorBackend<F>>(&mut self, ctx: &mut StepContext<'_, F, B>) -> Result<()> {
        ctx.backend.write_scalar(self.vars.ro_old, czero())
    }

    fn iteration<B: VectorBackend<F>>(
        &mut self,
        nr: usize,
        ctx: &mut StepContext<'_, F, B>,
        _profiling_run: bool,
    ) -> Result<F> {
        let v = self.vars;
        let p = self.p;
        let r = ctx.vecs.r;
        let x = ctx.vecs.x;
        let av = ctx.vecs.av;
        let b = &mut *ctx.backend;

        if nr == 0 {
            {
                let _s = span(ctx.prof, "matvec1");
                b.apply(r, p, true, ctx.prof)?;
            }
            b.reduce(Reduction::Norm(p), v.ro_new)?;
        } else {
            {
                let _s = span(ctx.prof, "matvec1");
                b.apply(r, av, true, ctx.prof)?;
            }
            b.reduce(Reduction::Norm(av), v.ro_new)?;
            b.eval(v.beta, ScalarExpr::Div(v.ro_new, v.ro_old))?;
            b.lin_comb(p, &[(p, Coeff::Slot(v.beta)), (av, Coeff::one())])?;
        }

        {
            let _s = span(ctx.prof, "matvec2");
            b.apply(p, av, false, ctx.prof)?;
        }
        b.reduce(Reduction::Norm(av), v.ap_norm)?;
        b.eval(v.alpha, ScalarExpr::Div(v.ro_new, v.ap_norm))?;
        b.eval(v.neg_alpha, ScalarExpr::Neg(v.alpha))?;
        b.lin_comb(x, &[(p, Coeff::Slot(v.alpha)), (x, Coeff::one())])?;
        b.lin_comb(r, &[(av, Coeff::Slot(v.neg_alpha)), (r, Coeff::one())])?;
        b.eval(v.ro_old, ScalarExpr::Copy(v.ro_new))?;

        Ok(b.reduce_read(Reduction::Norm(r), v.res)?.re)
    }
}
