//! Quasi-Minimal Residual for complex-symmetric matrices.
//!
//! The Lanczos basis is built with unconjugated products (valid because
//! `A = Aᵀ`), and the tridiagonal least-squares problem is solved
//! incrementally with Givens rotations `(c, s)`. The residual is updated
//! from the rotation coefficients, so each step costs one operator
//! application and three reductions.

use super::{KrylovStep, SolverKind, StepContext, breakdown};
use crate::backend::{Coeff, Reduction, ScalarSlot, VecId, VectorBackend};
use crate::error::Result;
use crate::profiling::span;
use crate::scalar::{C, ExtReal, Real, cone, creal, czero};

/// Guard bounds, as single-precision literals in both precisions.
const BETA_MIN: f32 = 1e-10;
const BETA_MAX: f32 = 1e38;
const ZETA_TILDE_MIN: f32 = 1e-40;

#[derive(Debug, Clone, Copy)]
struct State<F: Real> {
    omega_old: F,
    omega_new: F,
    beta: C<F>,
    m_beta: C<F>,
    tau_tilde: C<F>,
    c_old: F,
    c_new: F,
    s_old: C<F>,
    s_new: C<F>,
}

#[derive(Debug)]
pub struct QmrCs<F: Real> {
    v: VecId,
    v_tilde: VecId,
    p_old: VecId,
    p_new: VecId,
    tmp: ScalarSlot,
    state: State<F>,
}

impl<F: Real> QmrCs<F> {
    pub fn new<B: VectorBackend<F>>(backend: &mut B) -> Result<Self> {
        Ok(Self {
            v: backend.alloc_vector("qmrcs.v")?,
            v_tilde: backend.alloc_vector("qmrcs.v_tilde")?,
            p_old: backend.alloc_vector("qmrcs.p_old")?,
            p_new: backend.alloc_vector("qmrcs.p_new")?,
            tmp: backend.alloc_scalar("qmrcs.tmp")?,
            state: State {
                omega_old: F::zero(),
                omega_new: F::zero(),
                beta: czero(),
                m_beta: czero(),
                tau_tilde: czero(),
                c_old: F::one(),
                c_new: F::one(),
                s_old: czero(),
                s_new: czero(),
            },
        })
    }
}

impl<F: Real> KrylovStep<F> for QmrCs<F> {
    fn kind(&self) -> SolverKind {
        SolverKind::QmrCs
    }

    fn init<B: VectorBackend<F>>(&mut self, ctx: &mut StepContext<'_, F, B>) -> Result<()> {
        let r = ctx.vecs.r;
        let r2 = ctx.backend.reduce_read(Reduction::DotUnconj(r, r), self.tmp)?;
        let st = &mut self.state;
        st.omega_old = F::zero();
        st.beta = r2.sqrt();
        st.m_beta = -st.beta;
        st.omega_new = ctx.inprod_r.sqrt() / st.beta.norm();
        st.tau_tilde = st.beta * st.omega_new;
        st.c_old = F::one();
        st.c_new = F::one();
        st.s_old = czero();
        st.s_new = czero();
        let beta_inv = cone::<F>() / st.beta;
        ctx.backend.lin_comb(self.v, &[(r, Coeff::Value(beta_inv))])
    }

    fn iteration<B: VectorBackend<F>>(
        &mut self,
        nr: usize,
        ctx: &mut StepContext<'_, F, B>,
        profiling_run: bool,
    ) -> Result<F> {
        let r = ctx.vecs.r;
        let x = ctx.vecs.x;
        let av = ctx.vecs.av;
        let tmp = self.tmp;
        let st = &mut self.state;
        let b = &mut *ctx.backend;

        let abs_beta = ExtReal::from_real(st.beta.norm());
        let rtmp1 = (abs_beta * abs_beta * ExtReal::from_real(ctx.resid_scale)).to_f64();
        if !profiling_run {
            let lo = f64::from(BETA_MIN);
            let hi = f64::from(BETA_MAX);
            // very small beta is allowed on the first step (warm starts)
            let bad = if nr == 0 {
                rtmp1 > hi
            } else {
                rtmp1 < lo || rtmp1 > hi
            };
            if bad {
                return Err(breakdown(SolverKind::QmrCs, "|beta|^2*resid_scale", rtmp1));
            }
        }

        {
            let _s = span(ctx.prof, "matvec");
            b.apply(self.v, av, false, ctx.prof)?;
        }

        let alpha = b.reduce_read(Reduction::DotUnconj(self.v, av), tmp)?;

        if nr == 0 {
            b.lin_comb(
                self.v_tilde,
                &[(self.v, Coeff::Value(-alpha)), (av, Coeff::one())],
            )?;
        } else {
            b.lin_comb(
                self.v_tilde,
                &[
                    (self.v_tilde, Coeff::Value(st.m_beta)),
                    (self.v, Coeff::Value(-alpha)),
                    (av, Coeff::one()),
                ],
            )?;
        }

        let ctmp3 = b.reduce_read(Reduction::DotUnconj(self.v_tilde, self.v_tilde), tmp)?;
        let rtmp2 = b.reduce_read(Reduction::Norm(self.v_tilde), tmp)?.re;

        let ctmp1 = st.beta * st.omega_old;
        let ctmp2 = alpha * st.omega_new;

        let theta = st.s_old.conj() * ctmp1;
        let eta = ctmp1 * (st.c_old * st.c_new) + st.s_new.conj() * ctmp2;
        let zeta_tilde = ctmp2 * st.c_new - st.s_new * ctmp1 * st.c_old;

        st.beta = ctmp3.sqrt();
        st.m_beta = -st.beta;
        st.omega_old = st.omega_new;
        st.omega_new = rtmp2.sqrt() / st.beta.norm();

        let zeta_abs = (zeta_tilde.norm_sqr() + rtmp2).sqrt();
        let rtmp3 = zeta_tilde.norm_sqr().sqrt();
        let zeta = if rtmp3 < F::lit(f64::from(ZETA_TILDE_MIN)) {
            creal(zeta_abs)
        } else {
            zeta_tilde * (zeta_abs / rtmp3)
        };

        st.c_old = st.c_new;
        st.c_new = rtmp3 / zeta_abs;
        st.s_old = st.s_new;
        st.s_new = (st.beta / zeta) * st.omega_new;

        let tau = st.tau_tilde * st.c_new;
        st.tau_tilde = -st.s_new * st.tau_tilde;

        let zeta_inv = cone::<F>() / zeta;
        let m_eta_zeta = -eta / zeta;
        let m_theta_zeta = -theta / zeta;
        let beta_inv = cone::<F>() / st.beta;
        let norm_s_new = st.s_new.norm_sqr();
        let c_tau = st.tau_tilde * (st.c_new / st.omega_new);

        if nr == 0 {
            b.lin_comb(self.p_new, &[(self.v, Coeff::Value(zeta_inv))])?;
        } else {
            if nr == 1 {
                b.lin_comb(
                    self.p_old,
                    &[
                        (self.p_new, Coeff::Value(m_eta_zeta)),
                        (self.v, Coeff::Value(zeta_inv)),
                    ],
                )?;
            } else {
                b.lin_comb(
                    self.p_old,
                    &[
                        (self.p_old, Coeff::Value(m_theta_zeta)),
                        (self.p_new, Coeff::Value(m_eta_zeta)),
                        (self.v, Coeff::Value(zeta_inv)),
                    ],
                )?;
            }
            std::mem::swap(&mut self.p_old, &mut self.p_new);
        }

        b.lin_comb(x, &[(self.p_new, Coeff::Value(tau)), (x, Coeff::one())])?;
        b.lin_comb(self.v_tilde, &[(self.v_tilde, Coeff::Value(beta_inv))])?;
        std::mem::swap(&mut self.v, &mut self.v_tilde);
        b.lin_comb(
            r,
            &[
                (r, Coeff::Value(creal(norm_s_new))),
                (self.v, Coeff::Value(c_tau)),
            ],
        )?;

        Ok(b.reduce_read(Reduction::Norm(r), tmp)?.re)
    }
}
