//! Single-threaded host backend.

use crate::backend::{Coeff, Reduction, ScalarExpr, ScalarSlot, VecId, VectorBackend};
use crate::error::{Error, Result};
use crate::lincomb::{self, Term};
use crate::operator::LinearOperator;
use crate::profiling::Profiler;
use crate::scalar::{C, Real, czero, creal};
use dipola_core::CoupleConstants;
use std::sync::Arc;

/// Contiguous host vectors and a host scalar record.
///
/// Every call runs synchronously on the calling thread.
pub struct CpuBackend<F: Real> {
    operator: Box<dyn LinearOperator<F>>,
    size: usize,
    vectors: Vec<Vec<C<F>>>,
    labels: Vec<String>,
    scalars: Vec<C<F>>,
}

impl<F: Real> CpuBackend<F> {
    pub fn new(operator: Box<dyn LinearOperator<F>>) -> Self {
        let size = operator.vec_size();
        Self {
            operator,
            size,
            vectors: Vec::new(),
            labels: Vec::new(),
            scalars: Vec::new(),
        }
    }

    /// Direct access for tests and diagnostics.
    pub fn vector(&self, v: VecId) -> &[C<F>] {
        &self.vectors[v.index()]
    }

    pub fn label(&self, v: VecId) -> &str {
        &self.labels[v.index()]
    }

    fn coeff(&self, c: Coeff<F>) -> C<F> {
        match c {
            Coeff::Value(v) => v,
            Coeff::Slot(s) => self.scalars[s.index()],
        }
    }
}

impl<F: Real> VectorBackend<F> for CpuBackend<F> {
    fn name(&self) -> &str {
        "cpu"
    }

    fn vec_size(&self) -> usize {
        self.size
    }

    fn alloc_vector(&mut self, label: &str) -> Result<VecId> {
        self.vectors.push(vec![czero(); self.size]);
        self.labels.push(label.to_string());
        Ok(VecId(self.vectors.len() - 1))
    }

    fn alloc_scalar(&mut self, _label: &str) -> Result<ScalarSlot> {
        self.scalars.push(czero());
        Ok(ScalarSlot((self.scalars.len() - 1) as u32))
    }

    fn set_couple_constants(&mut self, cc: Arc<CoupleConstants<F>>) -> Result<()> {
        self.operator.set_couple_constants(cc)
    }

    fn apply(
        &mut self,
        input: VecId,
        output: VecId,
        conjugate: bool,
        prof: Option<&Profiler>,
    ) -> Result<()> {
        if input == output {
            return Err(Error::InvalidConfig(
                "operator input and output must be different vectors".to_string(),
            ));
        }
        let mut out = std::mem::take(&mut self.vectors[output.index()]);
        let result = self
            .operator
            .apply(&self.vectors[input.index()], &mut out, conjugate, prof);
        self.vectors[output.index()] = out;
        result
    }

    fn lin_comb(&mut self, out: VecId, terms: &[(VecId, Coeff<F>)]) -> Result<()> {
        if terms.is_empty() || terms.len() > 3 {
            return Err(Error::InvalidConfig(format!(
                "linear combination of {} terms",
                terms.len()
            )));
        }
        let mut dst = std::mem::take(&mut self.vectors[out.index()]);
        let this = &*self;
        let term = move |i: usize| {
            let (v, c) = terms[i];
            let c = this.coeff(c);
            if v == out {
                Term::Output(c)
            } else {
                Term::Input(&this.vectors[v.index()], c)
            }
        };
        match terms.len() {
            1 => lincomb::lin_comb(&mut dst, &[term(0)]),
            2 => lincomb::lin_comb(&mut dst, &[term(0), term(1)]),
            _ => lincomb::lin_comb(&mut dst, &[term(0), term(1), term(2)]),
        }
        self.vectors[out.index()] = dst;
        Ok(())
    }

    fn zero(&mut self, v: VecId) -> Result<()> {
        self.vectors[v.index()].fill(czero());
        Ok(())
    }

    fn swap(&mut self, a: VecId, b: VecId) {
        self.vectors.swap(a.index(), b.index());
    }

    fn reduce(&mut self, reduction: Reduction, out: ScalarSlot) -> Result<()> {
        let v = &self.vectors;
        self.scalars[out.index()] = match reduction {
            Reduction::Norm(a) => creal(lincomb::norm(&v[a.index()])),
            Reduction::Dot(a, b) => lincomb::dot_conj(&v[a.index()], &v[b.index()]),
            Reduction::DotUnconj(a, b) => lincomb::dot_unconj(&v[a.index()], &v[b.index()]),
        };
        Ok(())
    }

    fn eval(&mut self, out: ScalarSlot, expr: ScalarExpr<F>) -> Result<()> {
        let value = expr.eval(|s| self.scalars[s.index()]);
        self.scalars[out.index()] = value;
        Ok(())
    }

    fn read_scalar(&mut self, slot: ScalarSlot) -> Result<C<F>> {
        Ok(self.scalars[slot.index()])
    }

    fn write_scalar(&mut self, slot: ScalarSlot, value: C<F>) -> Result<()> {
        self.scalars[slot.index()] = value;
        Ok(())
    }

    fn upload(&mut self, v: VecId, data: &[C<F>]) -> Result<()> {
        if data.len() != self.size {
            return Err(Error::DimensionMismatch {
                expected: self.size,
                actual: data.len(),
            });
        }
        self.vectors[v.index()].copy_from_slice(data);
        Ok(())
    }

    fn download(&mut self, v: VecId) -> Result<Vec<C<F>>> {
        Ok(self.vectors[v.index()].clone())
    }
}
