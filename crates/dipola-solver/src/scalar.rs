//! Numeric traits and extended-range arithmetic.
//!
//! Vectors are stored in single or double precision, but the ratios the
//! solvers test for breakdown are products and quotients of inner products
//! that can leave the exponent range of `f32` (and occasionally `f64`).
//! [`ExtComplex`] and [`ExtReal`] carry a separate binary exponent so those
//! guards see the true value.

use dipola_core::FloatType;
use num_complex::Complex;
use num_traits::FloatConst;
use std::fmt::LowerExp;
use std::ops::{Div, Mul};

/// Floating-point precision the solvers are generic over.
pub trait Real: FloatType + FloatConst + rustfft::FftNum + LowerExp {
    /// Short name for logs ("f32" / "f64").
    const NAME: &'static str;

    /// Convert an `f64` literal, rounding to this precision.
    fn lit(v: f64) -> Self;

    /// Widen to `f64`.
    fn as_f64(self) -> f64;
}

impl Real for f32 {
    const NAME: &'static str = "f32";

    fn lit(v: f64) -> Self {
        v as f32
    }

    fn as_f64(self) -> f64 {
        self as f64
    }
}

impl Real for f64 {
    const NAME: &'static str = "f64";

    fn lit(v: f64) -> Self {
        v
    }

    fn as_f64(self) -> f64 {
        self
    }
}

/// Complex number in precision `F`.
pub type C<F> = Complex<F>;

/// Complex zero.
#[inline]
pub fn czero<F: Real>() -> C<F> {
    Complex::new(F::zero(), F::zero())
}

/// Complex one.
#[inline]
pub fn cone<F: Real>() -> C<F> {
    Complex::new(F::one(), F::zero())
}

/// Real value as a complex number.
#[inline]
pub fn creal<F: Real>(v: F) -> C<F> {
    Complex::new(v, F::zero())
}

const TWO_POW_64: f64 = 18_446_744_073_709_551_616.0;

/// Split `x` into a mantissa in `[0.5, 1)` and a power of two.
fn frexp(x: f64) -> (f64, i32) {
    if x == 0.0 || !x.is_finite() {
        return (x, 0);
    }
    let bits = x.to_bits();
    let exp = ((bits >> 52) & 0x7ff) as i32;
    if exp == 0 {
        let (m, e) = frexp(x * TWO_POW_64);
        return (m, e - 64);
    }
    let mantissa = f64::from_bits((bits & !(0x7ffu64 << 52)) | (1022u64 << 52));
    (mantissa, exp - 1022)
}

/// `x * 2^e` without intermediate overflow of the scale factor.
fn ldexp(mut x: f64, mut e: i32) -> f64 {
    let up = 2f64.powi(1000);
    let down = 2f64.powi(-1000);
    while e > 1000 {
        x *= up;
        e -= 1000;
        if !x.is_finite() {
            return x;
        }
    }
    while e < -1000 {
        x *= down;
        e += 1000;
        if x == 0.0 {
            return x;
        }
    }
    x * 2f64.powi(e)
}

/// Non-negative real with an unbounded binary exponent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtReal {
    m: f64,
    e: i32,
}

impl ExtReal {
    pub fn new(value: f64) -> Self {
        Self { m: value, e: 0 }.normalized()
    }

    pub fn from_real<F: Real>(value: F) -> Self {
        Self::new(value.as_f64())
    }

    fn normalized(self) -> Self {
        if self.m == 0.0 || !self.m.is_finite() {
            return Self { m: self.m, e: 0 };
        }
        let (m, k) = frexp(self.m);
        Self { m, e: self.e + k }
    }

    /// Nearest `f64` (may be infinite or zero).
    pub fn to_f64(self) -> f64 {
        ldexp(self.m, self.e)
    }
}

impl Mul for ExtReal {
    type Output = ExtReal;

    fn mul(self, rhs: ExtReal) -> ExtReal {
        Self {
            m: self.m * rhs.m,
            e: self.e + rhs.e,
        }
        .normalized()
    }
}

impl Div for ExtReal {
    type Output = ExtReal;

    fn div(self, rhs: ExtReal) -> ExtReal {
        Self {
            m: self.m / rhs.m,
            e: self.e - rhs.e,
        }
        .normalized()
    }
}

/// Complex number with an unbounded binary exponent.
///
/// The larger of `|re|` and `|im|` is kept in `[0.5, 1)`, so products and
/// quotients of mantissas never overflow.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtComplex {
    re: f64,
    im: f64,
    e: i32,
}

impl ExtComplex {
    pub fn new(re: f64, im: f64) -> Self {
        Self { re, im, e: 0 }.normalized()
    }

    pub fn from_complex<F: Real>(c: C<F>) -> Self {
        Self::new(c.re.as_f64(), c.im.as_f64())
    }

    fn normalized(self) -> Self {
        let scale = self.re.abs().max(self.im.abs());
        if scale == 0.0 || !scale.is_finite() || self.re.is_nan() || self.im.is_nan() {
            return Self {
                re: self.re,
                im: self.im,
                e: 0,
            };
        }
        let (_, k) = frexp(scale);
        Self {
            re: ldexp(self.re, -k),
            im: ldexp(self.im, -k),
            e: self.e + k,
        }
    }

    /// Modulus.
    pub fn abs(self) -> ExtReal {
        ExtReal {
            m: self.re.hypot(self.im),
            e: self.e,
        }
        .normalized()
    }

    /// Round back to precision `F`.
    pub fn to_complex<F: Real>(self) -> C<F> {
        Complex::new(F::lit(ldexp(self.re, self.e)), F::lit(ldexp(self.im, self.e)))
    }
}

impl From<ExtReal> for ExtComplex {
    fn from(r: ExtReal) -> Self {
        Self {
            re: r.m,
            im: 0.0,
            e: r.e,
        }
        .normalized()
    }
}

impl Mul for ExtComplex {
    type Output = ExtComplex;

    fn mul(self, rhs: ExtComplex) -> ExtComplex {
        Self {
            re: self.re * rhs.re - self.im * rhs.im,
            im: self.re * rhs.im + self.im * rhs.re,
            e: self.e + rhs.e,
        }
        .normalized()
    }
}

impl Div for ExtComplex {
    type Output = ExtComplex;

    fn div(self, rhs: ExtComplex) -> ExtComplex {
        let den = rhs.re * rhs.re + rhs.im * rhs.im;
        Self {
            re: (self.re * rhs.re + self.im * rhs.im) / den,
            im: (self.im * rhs.re - self.re * rhs.im) / den,
            e: self.e - rhs.e,
        }
        .normalized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frexp_ldexp() {
        for &x in &[1.0, 0.75, 3.0, 1e-310, 1e300, -5.5] {
            let (m, e) = frexp(x);
            assert!(m.abs() >= 0.5 && m.abs() < 1.0, "mantissa {} for {}", m, x);
            assert_eq!(ldexp(m, e), x);
        }
        assert_eq!(frexp(0.0), (0.0, 0));
    }

    #[test]
    fn test_single_precision_product_does_not_overflow() {
        // 1e30 * 1e30 overflows f32 but the ratio is 1
        let a = ExtComplex::from_complex(Complex::new(1e30f32, 0.0));
        let b = ExtComplex::from_complex(Complex::new(0.0f32, 1e30));
        let num = a * b;
        let den = b * a;
        let ratio = (num / den).to_complex::<f32>();
        assert!((ratio - Complex::new(1.0, 0.0)).norm() < 1e-6);
        assert!(((num.abs() / den.abs()).to_f64() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_underflow_ratio_survives() {
        let tiny = ExtReal::new(1e-300) * ExtReal::new(1e-300);
        let tinier = ExtReal::new(1e-310) * ExtReal::new(1e-300);
        assert_eq!(tiny.to_f64(), 0.0);
        let r = (tinier / tiny).to_f64();
        assert!((r - 1e-10).abs() < 1e-20);
    }

    #[test]
    fn test_complex_division() {
        let a = ExtComplex::new(3.0, 4.0);
        let b = ExtComplex::new(1.0, -2.0);
        let q = (a / b).to_complex::<f64>();
        let expected = Complex::new(3.0, 4.0) / Complex::new(1.0, -2.0);
        assert!((q - expected).norm() < 1e-14);
        assert!((a.abs().to_f64() - 5.0).abs() < 1e-14);
    }

    #[test]
    fn test_division_by_zero_is_not_finite() {
        let q = ExtComplex::new(1.0, 0.0) / ExtComplex::new(0.0, 0.0);
        let c = q.to_complex::<f64>();
        assert!(!c.re.is_finite());
    }
}
