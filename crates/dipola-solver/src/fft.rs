//! Three-dimensional FFT on top of `rustfft` one-dimensional plans.
//!
//! Grids are stored x-fastest: `index = x + nx * (y + ny * z)`. The x pass
//! transforms all rows in one call; the y and z passes gather each strided
//! line into a buffer first.

use crate::scalar::{C, Real, czero};
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Forward and inverse plans for a fixed grid shape.
pub struct Fft3<F: Real> {
    dims: [usize; 3],
    forward: [Arc<dyn Fft<F>>; 3],
    inverse: [Arc<dyn Fft<F>>; 3],
    line: Vec<C<F>>,
    scratch: Vec<C<F>>,
}

impl<F: Real> Fft3<F> {
    pub fn new(dims: [usize; 3]) -> Self {
        let mut planner = FftPlanner::new();
        let forward = dims.map(|n| planner.plan_fft_forward(n));
        let inverse = dims.map(|n| planner.plan_fft_inverse(n));
        let scratch_len = forward
            .iter()
            .chain(inverse.iter())
            .map(|p| p.get_inplace_scratch_len())
            .max()
            .unwrap_or(0);
        let line_len = dims.iter().copied().max().unwrap_or(0);
        Self {
            dims,
            forward,
            inverse,
            line: vec![czero(); line_len],
            scratch: vec![czero(); scratch_len],
        }
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// Number of grid points.
    pub fn len(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unnormalized forward transform in place.
    pub fn forward(&mut self, data: &mut [C<F>]) {
        self.transform(data, false);
    }

    /// Unnormalized inverse transform in place (no `1/N` factor).
    pub fn inverse(&mut self, data: &mut [C<F>]) {
        self.transform(data, true);
    }

    fn transform(&mut self, data: &mut [C<F>], inverse: bool) {
        debug_assert_eq!(data.len(), self.len());
        if data.is_empty() {
            return;
        }
        let [nx, ny, nz] = self.dims;
        let plans = if inverse { &self.inverse } else { &self.forward };

        plans[0].process_with_scratch(data, &mut self.scratch);

        let line = &mut self.line[..ny];
        for z in 0..nz {
            for x in 0..nx {
                let base = x + nx * ny * z;
                for (y, v) in line.iter_mut().enumerate() {
                    *v = data[base + nx * y];
                }
                plans[1].process_with_scratch(line, &mut self.scratch);
                for (y, v) in line.iter().enumerate() {
                    data[base + nx * y] = *v;
                }
            }
        }

        let line = &mut self.line[..nz];
        let plane = nx * ny;
        for base in 0..plane {
            for (z, v) in line.iter_mut().enumerate() {
                *v = data[base + plane * z];
            }
            plans[2].process_with_scratch(line, &mut self.scratch);
            for (z, v) in line.iter().enumerate() {
                data[base + plane * z] = *v;
            }
        }
    }
}
