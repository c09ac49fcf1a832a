//! Host vector kernels.
//!
//! These are the building blocks of the CPU backend and of the host-emulated
//! device. Sums are accumulated serially from index 0 upward so results do
//! not depend on thread scheduling.

use crate::scalar::{C, Real, czero};

/// One term of [`lin_comb`].
#[derive(Clone, Copy)]
pub enum Term<'a, F: Real> {
    /// The current contents of the output vector times a coefficient.
    Output(C<F>),
    /// Another vector times a coefficient.
    Input(&'a [C<F>], C<F>),
}

/// `out = Σ cᵢ vᵢ` in a single pass.
///
/// A term may refer to `out` itself through [`Term::Output`]; each element
/// is read before it is overwritten.
pub fn lin_comb<F: Real>(out: &mut [C<F>], terms: &[Term<'_, F>]) {
    debug_assert!(!terms.is_empty() && terms.len() <= 3);
    for i in 0..out.len() {
        let mut acc = czero();
        for term in terms {
            acc = acc
                + match *term {
                    Term::Output(c) => out[i] * c,
                    Term::Input(v, c) => v[i] * c,
                };
        }
        out[i] = acc;
    }
}

/// Squared 2-norm `Σ |vᵢ|²`.
pub fn norm<F: Real>(v: &[C<F>]) -> F {
    v.iter().fold(F::zero(), |acc, x| acc + x.norm_sqr())
}

/// Hermitian inner product `Σ aᵢ conj(bᵢ)`.
pub fn dot_conj<F: Real>(a: &[C<F>], b: &[C<F>]) -> C<F> {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b)
        .fold(czero(), |acc, (&x, &y)| acc + x * y.conj())
}

/// Bilinear product `Σ aᵢ bᵢ` used by the complex-symmetric solvers.
pub fn dot_unconj<F: Real>(a: &[C<F>], b: &[C<F>]) -> C<F> {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).fold(czero(), |acc, (&x, &y)| acc + x * y)
}
