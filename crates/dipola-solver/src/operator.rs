//! Linear operator abstraction.
//!
//! The solvers never see the interaction matrix itself, only an operator
//! that applies it (or its adjoint) to a vector in the padded dipole layout.
//! [`FftMatVec`](crate::matvec::FftMatVec) is the production operator;
//! [`ScaledIdentity`] and [`DenseOperator`] are small explicit operators for
//! tests and benchmarks.

use crate::error::{Error, Result};
use crate::profiling::Profiler;
use crate::scalar::{C, Real, czero};
use dipola_core::CoupleConstants;
use std::sync::Arc;

/// Operator `A` of the system `A x = b`.
pub trait LinearOperator<F: Real>: Send {
    /// Length of the vectors the operator acts on.
    fn vec_size(&self) -> usize;

    /// Rebind the per-material coupling constants used by later `apply` calls.
    fn set_couple_constants(&mut self, cc: Arc<CoupleConstants<F>>) -> Result<()>;

    /// `output = A input`, or `output = Aᴴ input` when `conjugate` is set.
    ///
    /// `input` and `output` must not alias.
    fn apply(
        &mut self,
        input: &[C<F>],
        output: &mut [C<F>],
        conjugate: bool,
        prof: Option<&Profiler>,
    ) -> Result<()>;
}

/// Fail with [`Error::DimensionMismatch`] unless both lengths equal `n`.
pub(crate) fn check_dims<F>(n: usize, input: &[C<F>], output: &[C<F>]) -> Result<()> {
    for len in [input.len(), output.len()] {
        if len != n {
            return Err(Error::DimensionMismatch {
                expected: n,
                actual: len,
            });
        }
    }
    Ok(())
}

/// `A = s I`. Ignores coupling constants.
#[derive(Debug, Clone)]
pub struct ScaledIdentity<F: Real> {
    size: usize,
    scale: C<F>,
}

impl<F: Real> ScaledIdentity<F> {
    pub fn new(size: usize, scale: C<F>) -> Self {
        Self { size, scale }
    }
}

impl<F: Real> LinearOperator<F> for ScaledIdentity<F> {
    fn vec_size(&self) -> usize {
        self.size
    }

    fn set_couple_constants(&mut self, _cc: Arc<CoupleConstants<F>>) -> Result<()> {
        Ok(())
    }

    fn apply(
        &mut self,
        input: &[C<F>],
        output: &mut [C<F>],
        conjugate: bool,
        _prof: Option<&Profiler>,
    ) -> Result<()> {
        check_dims(self.size, input, output)?;
        let s = if conjugate {
            self.scale.conj()
        } else {
            self.scale
        };
        for (o, &i) in output.iter_mut().zip(input) {
            *o = i * s;
        }
        Ok(())
    }
}

/// Explicit row-major `n x n` matrix. Ignores coupling constants.
#[derive(Debug, Clone)]
pub struct DenseOperator<F: Real> {
    n: usize,
    entries: Vec<C<F>>,
}

impl<F: Real> DenseOperator<F> {
    /// Build from row-major entries.
    pub fn new(n: usize, entries: Vec<C<F>>) -> Result<Self> {
        if entries.len() != n * n {
            return Err(Error::DimensionMismatch {
                expected: n * n,
                actual: entries.len(),
            });
        }
        Ok(Self { n, entries })
    }

    /// Build from a function of `(row, col)`.
    pub fn from_fn(n: usize, f: impl Fn(usize, usize) -> C<F>) -> Self {
        let entries = (0..n * n).map(|k| f(k / n, k % n)).collect();
        Self { n, entries }
    }

    pub fn entry(&self, row: usize, col: usize) -> C<F> {
        self.entries[row * self.n + col]
    }
}

impl<F: Real> LinearOperator<F> for DenseOperator<F> {
    fn vec_size(&self) -> usize {
        self.n
    }

    fn set_couple_constants(&mut self, _cc: Arc<CoupleConstants<F>>) -> Result<()> {
        Ok(())
    }

    fn apply(
        &mut self,
        input: &[C<F>],
        output: &mut [C<F>],
        conjugate: bool,
        _prof: Option<&Profiler>,
    ) -> Result<()> {
        check_dims(self.n, input, output)?;
        for (row, o) in output.iter_mut().enumerate() {
            let mut sum = czero();
            for (col, &x) in input.iter().enumerate() {
                let a = if conjugate {
                    self.entry(col, row).conj()
                } else {
                    self.entry(row, col)
                };
                sum = sum + a * x;
            }
            *o = sum;
        }
        Ok(())
    }
}
