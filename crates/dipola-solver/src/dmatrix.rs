//! Fourier-space interaction tensor.
//!
//! The interaction between two dipoles depends only on their offset, so
//! applying it is a convolution. The six independent components of the
//! symmetric 3x3 tensor are sampled on the doubled FFT grid (negative
//! offsets wrap around), transformed once, and scaled by `-1/N` so that a
//! forward FFT, a pointwise multiply and an unnormalized inverse FFT give
//! `-G * x`.

use crate::fft::Fft3;
use crate::scalar::{C, Real, czero};
use dipola_core::DdaParams;
use num_complex::{Complex, Complex64};

/// Component order of the packed symmetric tensor: xx, xy, xz, yy, yz, zz.
pub const SYM_COMPONENTS: [(usize, usize); 6] = [(0, 0), (0, 1), (0, 2), (1, 1), (1, 2), (2, 2)];

/// Index into the packed symmetric tensor.
#[inline]
pub fn sym_index(mu: usize, nu: usize) -> usize {
    let (a, b) = if mu <= nu { (mu, nu) } else { (nu, mu) };
    match (a, b) {
        (0, 0) => 0,
        (0, 1) => 1,
        (0, 2) => 2,
        (1, 1) => 3,
        (1, 2) => 4,
        _ => 5,
    }
}

/// Free-space dipole interaction term for offset `r` (grid units).
///
/// `exp(i kr)/r³ [(3 - kr² - 3i kr) q_μ q_ν + δ_μν (kr² - 1 + i kr)]` with
/// `q = r/|r|` and `kr = kd |r|`; zero at the origin.
pub fn interaction_term(kd: f64, r: [f64; 3], mu: usize, nu: usize) -> Complex64 {
    let rr = (r[0] * r[0] + r[1] * r[1] + r[2] * r[2]).sqrt();
    if rr == 0.0 {
        return Complex64::new(0.0, 0.0);
    }
    let q = [r[0] / rr, r[1] / rr, r[2] / rr];
    let kr = kd * rr;
    let kr2 = kr * kr;
    let expval = Complex64::new(0.0, kr).exp() / (rr * rr * rr);
    let mut br = Complex64::new(3.0 - kr2, -3.0 * kr) * (q[mu] * q[nu]);
    if mu == nu {
        br += Complex64::new(kr2 - 1.0, kr);
    }
    expval * br
}

/// Transformed interaction tensor on the FFT grid.
#[derive(Debug, Clone)]
pub struct DMatrix<F: Real> {
    dims: [usize; 3],
    components: [Vec<C<F>>; 6],
}

impl<F: Real> DMatrix<F> {
    /// Free-space interaction tensor for `params`.
    pub fn new(params: &DdaParams) -> Self {
        let kd = params.kd();
        Self::from_kernel(params, |r, mu, nu| interaction_term(kd, r, mu, nu))
    }

    /// Build from an arbitrary kernel `g(r, mu, nu)`.
    ///
    /// The kernel is sampled for every offset with `|r_axis| < box_axis`
    /// and is read only for `mu <= nu`. The resulting operator is complex
    /// symmetric when `g(-r) = g(r)`.
    pub fn from_kernel(params: &DdaParams, kernel: impl Fn([f64; 3], usize, usize) -> Complex64) -> Self {
        let g = params.grid_size();
        let dims = [g.x, g.y, g.z];
        let b = params.geometry().box_size();
        let bx = b.x as i64;
        let by = b.y as i64;
        let bz = b.z as i64;
        let len: usize = dims.iter().product();
        let wrap = |v: i64, n: usize| -> usize {
            if v < 0 { (v + n as i64) as usize } else { v as usize }
        };

        let mut fft = Fft3::<F>::new(dims);
        let scale = -F::lit(len as f64);
        let components = std::array::from_fn(|component| {
            let (mu, nu) = SYM_COMPONENTS[component];
            let mut data = vec![czero::<F>(); len];
            for k in (1 - bz)..bz {
                for j in (1 - by)..by {
                    for i in (1 - bx)..bx {
                        let v = kernel([i as f64, j as f64, k as f64], mu, nu);
                        let idx = wrap(i, dims[0]) + dims[0] * (wrap(j, dims[1]) + dims[1] * wrap(k, dims[2]));
                        data[idx] = Complex::new(F::lit(v.re), F::lit(v.im));
                    }
                }
            }
            fft.forward(&mut data);
            for v in &mut data {
                *v = *v / scale;
            }
            data
        });

        log::debug!(
            "DMatrix: {}x{}x{} grid, {} precision",
            dims[0],
            dims[1],
            dims[2],
            F::NAME
        );

        Self { dims, components }
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// `y = D(p) x` at grid point `p`.
    #[inline]
    pub fn mult(&self, p: usize, x: [C<F>; 3]) -> [C<F>; 3] {
        let d = |mu: usize, nu: usize| self.components[sym_index(mu, nu)][p];
        std::array::from_fn(|mu| d(mu, 0) * x[0] + d(mu, 1) * x[1] + d(mu, 2) * x[2])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dipola_core::DipoleGeometry;

    #[test]
    fn test_sym_index_is_symmetric() {
        for mu in 0..3 {
            for nu in 0..3 {
                assert_eq!(sym_index(mu, nu), sym_index(nu, mu));
            }
        }
        for (i, &(mu, nu)) in SYM_COMPONENTS.iter().enumerate() {
            assert_eq!(sym_index(mu, nu), i);
        }
    }

    #[test]
    fn test_interaction_static_limit() {
        // kd = 0: (3 q q - I) / r³
        let t = interaction_term(0.0, [2.0, 0.0, 0.0], 0, 0);
        assert!((t - Complex64::new(2.0 / 8.0, 0.0)).norm() < 1e-15);
        let t = interaction_term(0.0, [2.0, 0.0, 0.0], 1, 1);
        assert!((t - Complex64::new(-1.0 / 8.0, 0.0)).norm() < 1e-15);
        assert_eq!(interaction_term(1.0, [0.0; 3], 0, 0), Complex64::new(0.0, 0.0));
    }

    #[test]
    fn test_interaction_even_in_r() {
        let a = interaction_term(0.7, [1.0, -2.0, 3.0], 0, 1);
        let b = interaction_term(0.7, [-1.0, 2.0, -3.0], 0, 1);
        assert!((a - b).norm() < 1e-15);
    }

    #[test]
    fn test_point_kernel_gives_constant_spectrum() {
        // kernel nonzero only at offset (1, 0, 0) and (-1, 0, 0)
        let params = DdaParams::new(DipoleGeometry::cuboid(2, 1, 1, 1.0), 1.0, 1, true).unwrap();
        let d = DMatrix::<f64>::from_kernel(&params, |r, _, _| {
            if r[0].abs() == 1.0 { Complex64::new(1.0, 0.0) } else { Complex64::new(0.0, 0.0) }
        });
        // grid 4x2x2, FT of delta(1) + delta(-1) along x is 2 cos(2πk/4)
        let n = 16.0;
        let expect = [2.0, 0.0, -2.0, 0.0];
        for (kx, e) in expect.iter().enumerate() {
            let v = d.components[0][kx];
            assert!((v - Complex::new(-e / n, 0.0)).norm() < 1e-12, "kx={} v={}", kx, v);
        }
    }
}
