//! FFT-accelerated coupled-dipole operator.

use crate::dmatrix::DMatrix;
use crate::error::{Error, Result};
use crate::fft::Fft3;
use crate::operator::{LinearOperator, check_dims};
use crate::profiling::{Profiler, span};
use crate::scalar::{C, Real, czero};
use dipola_core::{CoupleConstants, DdaParams};
use std::sync::Arc;

/// `A x = x + S conv(D, S x)` with `S` the per-dipole `cc_sqrt` tensors.
///
/// `A` is complex symmetric, so the adjoint is evaluated as
/// `conj(A conj(x))`.
pub struct FftMatVec<F: Real> {
    params: Arc<DdaParams>,
    dmatrix: DMatrix<F>,
    cc: Option<Arc<CoupleConstants<F>>>,
    fft: Fft3<F>,
    grid: [Vec<C<F>>; 3],
    grid_index: Vec<usize>,
}

impl<F: Real> FftMatVec<F> {
    /// Operator with the free-space interaction tensor.
    pub fn new(params: Arc<DdaParams>) -> Self {
        let dmatrix = DMatrix::new(&params);
        Self::with_dmatrix(params, dmatrix)
    }

    /// Operator with a precomputed tensor.
    pub fn with_dmatrix(params: Arc<DdaParams>, dmatrix: DMatrix<F>) -> Self {
        let dims = dmatrix.dims();
        let fft = Fft3::new(dims);
        let len = fft.len();
        let grid_index = params
            .geometry()
            .positions()
            .iter()
            .map(|p| p.x as usize + dims[0] * (p.y as usize + dims[1] * p.z as usize))
            .collect();
        log::info!(
            "FFT operator: {} dipoles on {}x{}x{} grid ({})",
            params.nv_count(),
            dims[0],
            dims[1],
            dims[2],
            F::NAME
        );
        Self {
            params,
            dmatrix,
            cc: None,
            fft,
            grid: std::array::from_fn(|_| vec![czero(); len]),
            grid_index,
        }
    }

    pub fn params(&self) -> &Arc<DdaParams> {
        &self.params
    }
}

#[inline]
fn maybe_conj<F: Real>(v: [C<F>; 3], conj: bool) -> [C<F>; 3] {
    if conj { v.map(|c| c.conj()) } else { v }
}

impl<F: Real> LinearOperator<F> for FftMatVec<F> {
    fn vec_size(&self) -> usize {
        self.params.vec_size()
    }

    fn set_couple_constants(&mut self, cc: Arc<CoupleConstants<F>>) -> Result<()> {
        cc.check_materials(self.params.geometry().mat_count())?;
        self.cc = Some(cc);
        Ok(())
    }

    fn apply(
        &mut self,
        input: &[C<F>],
        output: &mut [C<F>],
        conjugate: bool,
        prof: Option<&Profiler>,
    ) -> Result<()> {
        let _matvec = span(prof, "matvec");
        check_dims(self.params.vec_size(), input, output)?;
        let cc = self.cc.as_ref().ok_or(Error::MissingCoupleConstants)?;
        let params = &self.params;
        let materials = params.geometry().material_indices();

        for g in &mut self.grid {
            g.fill(czero());
        }
        for (i, &idx) in self.grid_index.iter().enumerate() {
            let s = cc.cc_sqrt(materials[i] as usize);
            let a = maybe_conj(params.get(input, i), conjugate);
            for comp in 0..3 {
                self.grid[comp][idx] = s[comp] * a[comp];
            }
        }

        {
            let _fft = span(prof, "fft");
            for g in &mut self.grid {
                self.fft.forward(g);
            }
        }

        {
            let _mult = span(prof, "mult");
            let [gx, gy, gz] = &mut self.grid;
            for p in 0..gx.len() {
                let y = self.dmatrix.mult(p, [gx[p], gy[p], gz[p]]);
                gx[p] = y[0];
                gy[p] = y[1];
                gz[p] = y[2];
            }
        }

        {
            let _fft = span(prof, "fft");
            for g in &mut self.grid {
                self.fft.inverse(g);
            }
        }

        output.fill(czero());
        for (i, &idx) in self.grid_index.iter().enumerate() {
            let s = cc.cc_sqrt(materials[i] as usize);
            let a = maybe_conj(params.get(input, i), conjugate);
            let r: [C<F>; 3] = std::array::from_fn(|comp| s[comp] * self.grid[comp][idx] + a[comp]);
            params.set(output, i, maybe_conj(r, conjugate));
        }
        Ok(())
    }
}
