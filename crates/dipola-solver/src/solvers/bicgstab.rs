//! BiCGSTAB.
//!
//! BiCG step followed by a one-dimensional minimal-residual correction. The
//! intermediate residual `s` overwrites `r`; when `‖s‖²` already meets the
//! target the stabilizing half-step is skipped.

use super::{KrylovStep, SolverKind, StepContext, breakdown};
use crate::backend::{Coeff, Reduction, ScalarSlot, VecId, VectorBackend};
use crate::error::Result;
use crate::scalar::{C, ExtComplex, ExtReal, Real, czero};

/// Host copies of the recurrence scalars.
#[derive(Debug, Clone, Copy)]
struct State<F: Real> {
    ro_new: C<F>,
    ro_old: C<F>,
    alpha: C<F>,
    beta: C<F>,
    omega: C<F>,
}

#[derive(Debug)]
pub struct BicgStab<F: Real> {
    /// Shadow residual `r̃`, fixed at init.
    r_tilde: VecId,
    p: VecId,
    v: VecId,
    tmp: ScalarSlot,
    state: State<F>,
}

impl<F: Real> BicgStab<F> {
    pub fn new<B: VectorBackend<F>>(backend: &mut B) -> Result<Self> {
        Ok(Self {
            r_tilde: backend.alloc_vector("bicgstab.r_tilde")?,
            p: backend.alloc_vector("bicgstab.p")?,
            v: backend.alloc_vector("bicgstab.v")?,
            tmp: backend.alloc_scalar("bicgstab.tmp")?,
            state: State {
                ro_new: czero(),
                ro_old: czero(),
                alpha: czero(),
                beta: czero(),
                omega: czero(),
            },
        })
    }
}

impl<F: Real> KrylovStep<F> for BicgStab<F> {
    fn kind(&self) -> SolverKind {
        SolverKind::BicgStab
    }

    fn init<B: VectorBackend<F>>(&mut self, ctx: &mut StepContext<'_, F, B>) -> Result<()> {
        ctx.backend.copy(ctx.vecs.r, self.r_tilde)
    }

    fn iteration<B: VectorBackend<F>>(
        &mut self,
        nr: usize,
        ctx: &mut StepContext<'_, F, B>,
        profiling_run: bool,
    ) -> Result<F> {
        let (p, v, rt, tmp) = (self.p, self.v, self.r_tilde, self.tmp);
        let r = ctx.vecs.r;
        let x = ctx.vecs.x;
        let av = ctx.vecs.av;
        let st = &mut self.state;
        let b = &mut *ctx.backend;

        st.ro_new = b.reduce_read(Reduction::Dot(r, rt), tmp)?;
        if !profiling_run {
            let dtmp = (ExtReal::from_real(st.ro_new.norm()) / ExtReal::from_real(ctx.inprod_r))
                .to_f64();
            // NaN fails
            if !(dtmp >= 1e-16) {
                return Err(breakdown(SolverKind::BicgStab, "|rho|/|r|^2", dtmp));
            }
        }

        if nr == 0 {
            b.copy(r, p)?;
        } else {
            let ro_new_alpha = ExtComplex::from_complex(st.ro_new) * ExtComplex::from_complex(st.alpha);
            let ro_old_omega = ExtComplex::from_complex(st.ro_old) * ExtComplex::from_complex(st.omega);
            if !profiling_run {
                let dtmp = (ro_old_omega.abs() / ro_new_alpha.abs()).to_f64();
                if !(dtmp >= 10e-10) {
                    return Err(breakdown(SolverKind::BicgStab, "|rho_old*omega|/|rho_new*alpha|", dtmp));
                }
            }
            st.beta = (ro_new_alpha / ro_old_omega).to_complex();
            // p = β p - β ω v + r
            b.lin_comb(
                p,
                &[
                    (p, Coeff::Value(st.beta)),
                    (v, Coeff::Value(-st.beta * st.omega)),
                    (r, Coeff::one()),
                ],
            )?;
        }

        b.apply(p, v, false, ctx.prof)?;

        let v_rt = b.reduce_read(Reduction::Dot(v, rt), tmp)?;
        st.alpha = (ExtComplex::from_complex(st.ro_new) / ExtComplex::from_complex(v_rt)).to_complex();

        // s = r - α v, kept in r
        b.lin_comb(r, &[(v, Coeff::Value(-st.alpha)), (r, Coeff::one())])?;
        let s_norm = b.reduce_read(Reduction::Norm(r), tmp)?.re;

        if s_norm < ctx.eps_b && !profiling_run {
            log::debug!("BiCGSTAB: intermediate residual below target, skipping stabilization");
            b.lin_comb(x, &[(p, Coeff::Value(st.alpha)), (x, Coeff::one())])?;
            return Ok(s_norm);
        }

        b.apply(r, av, false, ctx.prof)?;
        let denum_omega = b.reduce_read(Reduction::Norm(av), tmp)?.re;
        let s_t = b.reduce_read(Reduction::Dot(r, av), tmp)?;
        st.omega = (ExtComplex::from_complex(s_t) / ExtComplex::from(ExtReal::from_real(denum_omega)))
            .to_complex();

        b.lin_comb(
            x,
            &[
                (p, Coeff::Value(st.alpha)),
                (r, Coeff::Value(st.omega)),
                (x, Coeff::one()),
            ],
        )?;
        b.lin_comb(r, &[(av, Coeff::Value(-st.omega)), (r, Coeff::one())])?;
        st.ro_old = st.ro_new;

        Ok(b.reduce_read(Reduction::Norm(r), tmp)?.re)
    }
}
