//! Per-material coupling constants.

use crate::FloatType;
use crate::error::{Error, Result};
use nalgebra::Vector3;
use num_complex::Complex;

/// Diagonal of a complex 3x3 tensor.
pub type DiagMatrix3<F> = Vector3<Complex<F>>;

/// Coupling constants for every material together with their square roots.
///
/// The operator works on the symmetrized system, so `cc_sqrt` is what the
/// solver applies to vectors; `cc` is kept for callers that need the
/// unscaled polarizability.
#[derive(Debug, Clone, PartialEq)]
pub struct CoupleConstants<F: FloatType> {
    cc: Vec<DiagMatrix3<F>>,
    cc_sqrt: Vec<DiagMatrix3<F>>,
}

impl<F: FloatType> CoupleConstants<F> {
    /// Build from one diagonal tensor per material.
    pub fn new(cc: Vec<DiagMatrix3<F>>) -> Self {
        let cc_sqrt = cc.iter().map(|t| t.map(|c| c.sqrt())).collect();
        Self { cc, cc_sqrt }
    }

    /// Unit tensors for `mat_count` materials.
    pub fn identity(mat_count: usize) -> Self {
        let one = Complex::new(F::one(), F::zero());
        Self::new(vec![Vector3::repeat(one); mat_count])
    }

    /// The same isotropic value for every material.
    pub fn isotropic(values: &[Complex<F>]) -> Self {
        Self::new(values.iter().map(|&v| Vector3::repeat(v)).collect())
    }

    pub fn mat_count(&self) -> usize {
        self.cc.len()
    }

    pub fn cc(&self, material: usize) -> &DiagMatrix3<F> {
        &self.cc[material]
    }

    pub fn cc_sqrt(&self, material: usize) -> &DiagMatrix3<F> {
        &self.cc_sqrt[material]
    }

    pub fn cc_all(&self) -> &[DiagMatrix3<F>] {
        &self.cc
    }

    pub fn cc_sqrt_all(&self) -> &[DiagMatrix3<F>] {
        &self.cc_sqrt
    }

    /// Fail unless there is a tensor for each of `mat_count` materials.
    pub fn check_materials(&self, mat_count: usize) -> Result<()> {
        if self.cc.len() < mat_count {
            return Err(Error::MaterialOutOfRange {
                index: mat_count - 1,
                count: self.cc.len(),
            });
        }
        Ok(())
    }

    /// Convert to another precision.
    pub fn cast<G: FloatType>(&self) -> CoupleConstants<G> {
        let conv = |t: &DiagMatrix3<F>| {
            t.map(|c| {
                Complex::new(
                    G::from(c.re).unwrap_or_else(G::nan),
                    G::from(c.im).unwrap_or_else(G::nan),
                )
            })
        };
        CoupleConstants {
            cc: self.cc.iter().map(conv).collect(),
            cc_sqrt: self.cc_sqrt.iter().map(conv).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqrt_squares_back() {
        let cc = CoupleConstants::<f64>::isotropic(&[Complex::new(-0.3, 0.7), Complex::new(2.0, 0.0)]);
        for m in 0..cc.mat_count() {
            for k in 0..3 {
                let s = cc.cc_sqrt(m)[k];
                assert!((s * s - cc.cc(m)[k]).norm() < 1e-14);
            }
        }
    }

    #[test]
    fn test_identity() {
        let cc = CoupleConstants::<f32>::identity(2);
        assert_eq!(cc.mat_count(), 2);
        assert_eq!(cc.cc_sqrt(1)[2], Complex::new(1.0, 0.0));
        assert!(cc.check_materials(2).is_ok());
        assert!(cc.check_materials(3).is_err());
    }

    #[test]
    fn test_cast_to_single() {
        let cc = CoupleConstants::<f64>::isotropic(&[Complex::new(4.0, 0.0)]);
        let single: CoupleConstants<f32> = cc.cast();
        assert_eq!(single.cc_sqrt(0)[0], Complex::new(2.0f32, 0.0));
    }
}
