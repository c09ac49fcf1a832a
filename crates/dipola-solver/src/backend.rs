//! Vector backends.
//!
//! Solvers do not own vectors directly. They allocate named vectors and
//! scalar slots from a [`VectorBackend`] and refer to them through the
//! copyable handles [`VecId`] and [`ScalarSlot`]. This lets the same solver
//! code run on contiguous host memory ([`CpuBackend`](crate::cpu::CpuBackend))
//! or on vectors split across compute devices
//! ([`DeviceBackend`](crate::device::DeviceBackend)), where scalars live in
//! a device-resident record and dependent scalar arithmetic is issued as
//! [`ScalarExpr`] without reading values back to the host.

use crate::error::Result;
use crate::profiling::Profiler;
use crate::scalar::{C, Real};
use dipola_core::CoupleConstants;
use std::sync::Arc;

/// Handle to a vector allocated from a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VecId(pub(crate) usize);

impl VecId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Handle to one complex scalar in the backend's scalar record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScalarSlot(pub(crate) u32);

impl ScalarSlot {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Coefficient of a linear-combination term.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Coeff<F: Real> {
    /// Value known on the host.
    Value(C<F>),
    /// Value held in a scalar slot, resolved where the vectors live.
    Slot(ScalarSlot),
}

impl<F: Real> Coeff<F> {
    pub fn one() -> Self {
        Coeff::Value(crate::scalar::cone())
    }

    pub fn minus_one() -> Self {
        Coeff::Value(-crate::scalar::cone::<F>())
    }
}

impl<F: Real> From<C<F>> for Coeff<F> {
    fn from(value: C<F>) -> Self {
        Coeff::Value(value)
    }
}

impl<F: Real> From<ScalarSlot> for Coeff<F> {
    fn from(slot: ScalarSlot) -> Self {
        Coeff::Slot(slot)
    }
}

/// Reductions over one or two vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    /// `Σ |vᵢ|²` (stored with zero imaginary part).
    Norm(VecId),
    /// `Σ aᵢ conj(bᵢ)`.
    Dot(VecId, VecId),
    /// `Σ aᵢ bᵢ`.
    DotUnconj(VecId, VecId),
}

/// Scalar arithmetic on the scalar record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalarExpr<F: Real> {
    Value(C<F>),
    Copy(ScalarSlot),
    Neg(ScalarSlot),
    Mul(ScalarSlot, ScalarSlot),
    /// `-(a b)`.
    NegMul(ScalarSlot, ScalarSlot),
    Div(ScalarSlot, ScalarSlot),
}

impl<F: Real> ScalarExpr<F> {
    /// Evaluate with `get` resolving slots.
    pub fn eval(&self, get: impl Fn(ScalarSlot) -> C<F>) -> C<F> {
        match *self {
            ScalarExpr::Value(v) => v,
            ScalarExpr::Copy(a) => get(a),
            ScalarExpr::Neg(a) => -get(a),
            ScalarExpr::Mul(a, b) => get(a) * get(b),
            ScalarExpr::NegMul(a, b) => -(get(a) * get(b)),
            ScalarExpr::Div(a, b) => get(a) / get(b),
        }
    }
}

/// Storage and vector arithmetic for the Krylov solvers.
///
/// All vectors have length [`vec_size`](VectorBackend::vec_size) in the
/// padded dipole layout. Operations on one backend are executed in issue
/// order; only `read_scalar` and `download` wait for results.
pub trait VectorBackend<F: Real> {
    /// Backend name for logs.
    fn name(&self) -> &str;

    fn vec_size(&self) -> usize;

    /// Allocate a zero-initialized vector.
    fn alloc_vector(&mut self, label: &str) -> Result<VecId>;

    /// Allocate a zero-initialized scalar slot.
    fn alloc_scalar(&mut self, label: &str) -> Result<ScalarSlot>;

    /// Forward new coupling constants to the operator.
    fn set_couple_constants(&mut self, cc: Arc<CoupleConstants<F>>) -> Result<()>;

    /// `output = A input` (or `Aᴴ input`). `input` and `output` must differ.
    fn apply(
        &mut self,
        input: VecId,
        output: VecId,
        conjugate: bool,
        prof: Option<&Profiler>,
    ) -> Result<()>;

    /// `out = Σ cᵢ vᵢ` for one to three terms; `out` may appear among the terms.
    fn lin_comb(&mut self, out: VecId, terms: &[(VecId, Coeff<F>)]) -> Result<()>;

    /// `to = from`.
    fn copy(&mut self, from: VecId, to: VecId) -> Result<()> {
        self.lin_comb(to, &[(from, Coeff::one())])
    }

    fn zero(&mut self, v: VecId) -> Result<()>;

    /// Exchange the storage behind two handles.
    fn swap(&mut self, a: VecId, b: VecId);

    /// Reduce into `out`.
    fn reduce(&mut self, reduction: Reduction, out: ScalarSlot) -> Result<()>;

    /// `out = expr`, evaluated where the scalars live.
    fn eval(&mut self, out: ScalarSlot, expr: ScalarExpr<F>) -> Result<()>;

    /// Blocking read of a scalar slot.
    fn read_scalar(&mut self, slot: ScalarSlot) -> Result<C<F>>;

    fn write_scalar(&mut self, slot: ScalarSlot, value: C<F>) -> Result<()>;

    /// Copy host data (padded layout) into `v`.
    fn upload(&mut self, v: VecId, data: &[C<F>]) -> Result<()>;

    /// Blocking read of `v` into host memory (padded layout).
    fn download(&mut self, v: VecId) -> Result<Vec<C<F>>>;

    /// Reduce and read back in one step.
    fn reduce_read(&mut self, reduction: Reduction, out: ScalarSlot) -> Result<C<F>> {
        self.reduce(reduction, out)?;
        self.read_scalar(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex;

    #[test]
    fn test_scalar_expr_eval() {
        let vals = [Complex::new(2.0, 0.0), Complex::new(0.0, 1.0)];
        let get = |s: ScalarSlot| vals[s.index()];
        let a = ScalarSlot::new(0);
        let b = ScalarSlot::new(1);
        assert_eq!(ScalarExpr::Div(b, a).eval(get), Complex::new(0.0, 0.5));
        assert_eq!(ScalarExpr::NegMul(a, b).eval(get), Complex::new(0.0, -2.0));
        assert_eq!(ScalarExpr::Neg(a).eval(get), Complex::new(-2.0, 0.0));
        assert_eq!(
            ScalarExpr::Value(Complex::new(1.0f64, 1.0)).eval(get),
            Complex::new(1.0, 1.0)
        );
    }
}
