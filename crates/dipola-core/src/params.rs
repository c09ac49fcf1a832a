//! Simulation parameters and the dipole vector layout.
//!
//! Dipole vectors store the three field components in separate blocks:
//! component `j` of dipole `i` lives at `i + j * vec_stride`, where
//! `vec_stride` is the dipole count padded to a multiple of
//! [`VEC_STRIDE_ALIGN`]. For multi-device execution the dipoles are split
//! into z-slabs, one per device, and each device stores its slab with the
//! same three-block layout and its own padded stride.

use crate::couple_constants::DiagMatrix3;
use crate::FloatType;
use crate::error::{Error, Result};
use crate::geometry::DipoleGeometry;
use nalgebra::Vector3;
use num_complex::Complex;
use std::f64::consts::PI;

/// Padding granularity of the per-component blocks.
pub const VEC_STRIDE_ALIGN: usize = 16;

/// Round `value` up to the next multiple of `align`.
pub fn round_up(value: usize, align: usize) -> usize {
    value.div_ceil(align) * align
}

/// Choose an FFT length of at least `x`.
///
/// Without non-power-of-two support this is the next power of two.
/// Otherwise it is the smallest even number whose odd part only has the
/// prime factors 3, 5 and 7.
pub fn fft_fit(x: usize, support_non_pow2: bool) -> usize {
    if x == 0 {
        return 0;
    }

    if !support_non_pow2 {
        let mut ret = 1;
        let mut x = x;
        while x > 1 {
            ret *= 2;
            x = x.div_ceil(2);
        }
        return ret;
    }

    let mut ret = if x % 2 == 1 { x + 1 } else { x };
    loop {
        let mut y = ret;
        for p in [2, 3, 5, 7] {
            while y % p == 0 {
                y /= p;
            }
        }
        if y == 1 {
            return ret;
        }
        ret += 2;
    }
}

/// Read-only parameters shared by the operator and the solvers.
#[derive(Debug, Clone)]
pub struct DdaParams {
    geometry: DipoleGeometry,
    lambda: f64,
    wavenumber: f64,
    procs: usize,
    vec_stride: usize,
    vec_size: usize,
    grid_size: Vector3<usize>,
    local_box_z: Vec<usize>,
    local_z0: Vec<usize>,
    local_vec0: Vec<usize>,
    local_nv_count: Vec<usize>,
    local_vec_stride: Vec<usize>,
}

impl DdaParams {
    /// Build parameters for `geometry` at wavelength `lambda`, partitioned
    /// over `procs` devices.
    ///
    /// Dipole positions must already be sorted by z.
    pub fn new(
        geometry: DipoleGeometry,
        lambda: f64,
        procs: usize,
        support_non_pow2: bool,
    ) -> Result<Self> {
        if !(lambda > 0.0) {
            return Err(Error::InvalidParameter(format!(
                "wavelength must be positive, got {}",
                lambda
            )));
        }
        if procs == 0 {
            return Err(Error::InvalidParameter(
                "at least one device is required".to_string(),
            ));
        }
        geometry.check()?;

        let positions = geometry.positions();
        if let Some(index) = positions.windows(2).position(|w| w[0].z > w[1].z) {
            return Err(Error::UnsortedPositions { index: index + 1 });
        }

        let nv_count = geometry.nv_count();
        let vec_stride = round_up(nv_count, VEC_STRIDE_ALIGN);
        let box_size = geometry.box_size();
        let grid_size = Vector3::new(
            fft_fit(box_size.x as usize * 2, support_non_pow2),
            fft_fit(box_size.y as usize * 2, support_non_pow2),
            fft_fit(box_size.z as usize * 2, support_non_pow2),
        );

        let mut local_box_z = Vec::with_capacity(procs);
        let mut z_rem = box_size.z as usize;
        for i in 0..procs {
            let val = z_rem.div_ceil(procs - i);
            local_box_z.push(val);
            z_rem -= val;
        }

        let mut local_z0 = Vec::with_capacity(procs);
        let mut local_vec0 = Vec::with_capacity(procs);
        let mut local_nv_count = Vec::with_capacity(procs);
        let mut z_sum = 0;
        let mut nv_sum = 0;
        for &box_z in &local_box_z {
            local_z0.push(z_sum);
            let z_end = (z_sum + box_z) as u32;
            let len = positions[nv_sum..]
                .iter()
                .take_while(|p| p.z < z_end)
                .count();
            local_vec0.push(nv_sum);
            local_nv_count.push(len);
            nv_sum += len;
            z_sum += box_z;
        }
        debug_assert_eq!(nv_sum, nv_count);

        let local_vec_stride = local_nv_count
            .iter()
            .map(|&n| round_up(n, VEC_STRIDE_ALIGN))
            .collect();

        log::debug!(
            "DdaParams: {} dipoles, stride {}, grid {}x{}x{}, {} device(s)",
            nv_count,
            vec_stride,
            grid_size.x,
            grid_size.y,
            grid_size.z,
            procs
        );

        Ok(Self {
            wavenumber: 2.0 * PI / lambda,
            geometry,
            lambda,
            procs,
            vec_stride,
            vec_size: vec_stride * 3,
            grid_size,
            local_box_z,
            local_z0,
            local_vec0,
            local_nv_count,
            local_vec_stride,
        })
    }

    pub fn geometry(&self) -> &DipoleGeometry {
        &self.geometry
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    /// Vacuum wavenumber `2π/λ`.
    pub fn wavenumber(&self) -> f64 {
        self.wavenumber
    }

    /// Wavenumber in units of the grid spacing.
    pub fn kd(&self) -> f64 {
        self.wavenumber * self.geometry.grid_unit()
    }

    pub fn grid_unit(&self) -> f64 {
        self.geometry.grid_unit()
    }

    pub fn procs(&self) -> usize {
        self.procs
    }

    pub fn nv_count(&self) -> usize {
        self.geometry.nv_count()
    }

    pub fn vec_stride(&self) -> usize {
        self.vec_stride
    }

    pub fn vec_size(&self) -> usize {
        self.vec_size
    }

    /// FFT grid extents (twice the box, fitted).
    pub fn grid_size(&self) -> Vector3<usize> {
        self.grid_size
    }

    pub fn local_box_z(&self, proc: usize) -> usize {
        self.local_box_z[proc]
    }

    pub fn local_z0(&self, proc: usize) -> usize {
        self.local_z0[proc]
    }

    /// Index of the first dipole owned by `proc`.
    pub fn local_vec0(&self, proc: usize) -> usize {
        self.local_vec0[proc]
    }

    pub fn local_nv_count(&self, proc: usize) -> usize {
        self.local_nv_count[proc]
    }

    pub fn local_vec_stride(&self, proc: usize) -> usize {
        self.local_vec_stride[proc]
    }

    pub fn local_vec_size(&self, proc: usize) -> usize {
        self.local_vec_stride[proc] * 3
    }

    /// The three components of dipole `index`.
    pub fn get<T: Copy>(&self, vec: &[T], index: usize) -> [T; 3] {
        [
            vec[index],
            vec[index + self.vec_stride],
            vec[index + 2 * self.vec_stride],
        ]
    }

    /// Store the three components of dipole `index`.
    pub fn set<T: Copy>(&self, vec: &mut [T], index: usize, value: [T; 3]) {
        for (j, v) in value.into_iter().enumerate() {
            vec[index + j * self.vec_stride] = v;
        }
    }

    /// Check that `len` matches the padded vector size.
    pub fn check_len(&self, len: usize) -> Result<()> {
        if len == self.vec_size {
            Ok(())
        } else {
            Err(Error::LengthMismatch {
                expected: self.vec_size,
                actual: len,
            })
        }
    }

    /// Multiply every dipole by the diagonal tensor of its material.
    pub fn mult_mat<F: FloatType>(
        &self,
        tensors: &[DiagMatrix3<F>],
        input: &[Complex<F>],
        output: &mut [Complex<F>],
    ) -> Result<()> {
        self.scale(tensors, input, output, false)
    }

    /// Divide every dipole by the diagonal tensor of its material.
    pub fn mult_mat_inv<F: FloatType>(
        &self,
        tensors: &[DiagMatrix3<F>],
        input: &[Complex<F>],
        output: &mut [Complex<F>],
    ) -> Result<()> {
        self.scale(tensors, input, output, true)
    }

    fn scale<F: FloatType>(
        &self,
        tensors: &[DiagMatrix3<F>],
        input: &[Complex<F>],
        output: &mut [Complex<F>],
        inverse: bool,
    ) -> Result<()> {
        self.check_len(input.len())?;
        self.check_len(output.len())?;
        for (i, &m) in self.geometry.material_indices().iter().enumerate() {
            let t = tensors.get(m as usize).ok_or(Error::MaterialOutOfRange {
                index: m as usize,
                count: tensors.len(),
            })?;
            let v = self.get(input, i);
            let scaled = if inverse {
                [v[0] / t[0], v[1] / t[1], v[2] / t[2]]
            } else {
                [v[0] * t[0], v[1] * t[1], v[2] * t[2]]
            };
            self.set(output, i, scaled);
        }
        Ok(())
    }
}
