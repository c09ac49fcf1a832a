//! Multi-device vector backend.

use super::{ComputeDevice, DeviceReduction, DipVector, PARTIAL_SLOT, SCALAR_RECORD_LEN};
use crate::backend::{Coeff, Reduction, ScalarExpr, ScalarSlot, VecId, VectorBackend};
use crate::error::{Error, Result};
use crate::operator::LinearOperator;
use crate::profiling::{Profiler, span};
use crate::scalar::{C, Real, czero};
use dipola_core::{CoupleConstants, DdaParams};
use std::sync::Arc;

/// [`VectorBackend`] over a set of [`ComputeDevice`]s.
///
/// Scalars are owned by device 0. A linear combination whose coefficients
/// reference slots first copies those slots from device 0 to the other
/// devices. Reductions are computed per device into [`PARTIAL_SLOT`], read
/// back in device order, summed on the host and written to device 0. The
/// operator runs on the host: the input is gathered, transformed and the
/// result scattered back.
pub struct DeviceBackend<F: Real> {
    params: Arc<DdaParams>,
    devices: Vec<Box<dyn ComputeDevice<F>>>,
    operator: Box<dyn LinearOperator<F>>,
    vectors: Vec<DipVector>,
    next_slot: u32,
    host_in: Vec<C<F>>,
    host_out: Vec<C<F>>,
    name: String,
}

impl<F: Real> DeviceBackend<F> {
    pub fn new(
        params: Arc<DdaParams>,
        devices: Vec<Box<dyn ComputeDevice<F>>>,
        operator: Box<dyn LinearOperator<F>>,
    ) -> Result<Self> {
        if devices.is_empty() || devices.len() != params.procs() {
            return Err(Error::InvalidConfig(format!(
                "{} devices for a {}-way partition",
                devices.len(),
                params.procs()
            )));
        }
        if operator.vec_size() != params.vec_size() {
            return Err(Error::DimensionMismatch {
                expected: params.vec_size(),
                actual: operator.vec_size(),
            });
        }
        let names: Vec<&str> = devices.iter().map(|d| d.name()).collect();
        let name = format!("devices[{}]", names.join(", "));
        log::info!("Device backend on {} ({} precision)", name, F::NAME);
        let size = params.vec_size();
        Ok(Self {
            params,
            devices,
            operator,
            vectors: Vec::new(),
            next_slot: PARTIAL_SLOT.0 + 1,
            host_in: vec![czero(); size],
            host_out: vec![czero(); size],
            name,
        })
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    fn dip(&self, v: VecId) -> &DipVector {
        &self.vectors[v.index()]
    }

    /// Make slot coefficients visible on every device.
    fn broadcast_slots(&mut self, terms: &[(VecId, Coeff<F>)]) -> Result<()> {
        if self.devices.len() == 1 {
            return Ok(());
        }
        for &(_, c) in terms {
            if let Coeff::Slot(slot) = c {
                let value = self.devices[0].read_scalar(slot)?;
                for device in &mut self.devices[1..] {
                    device.write_scalar(slot, value)?;
                }
            }
        }
        Ok(())
    }

    fn device_reduction(&self, reduction: Reduction, proc: usize) -> DeviceReduction {
        match reduction {
            Reduction::Norm(a) => DeviceReduction::Norm(self.dip(a).buffer(proc)),
            Reduction::Dot(a, b) => {
                DeviceReduction::Dot(self.dip(a).buffer(proc), self.dip(b).buffer(proc))
            }
            Reduction::DotUnconj(a, b) => {
                DeviceReduction::DotUnconj(self.dip(a).buffer(proc), self.dip(b).buffer(proc))
            }
        }
    }
}

impl<F: Real> VectorBackend<F> for DeviceBackend<F> {
    fn name(&self) -> &str {
        &self.name
    }

    fn vec_size(&self) -> usize {
        self.params.vec_size()
    }

    fn alloc_vector(&mut self, label: &str) -> Result<VecId> {
        let v = DipVector::new(&mut self.devices, &self.params, label)?;
        self.vectors.push(v);
        Ok(VecId(self.vectors.len() - 1))
    }

    fn alloc_scalar(&mut self, label: &str) -> Result<ScalarSlot> {
        if self.next_slot as usize >= SCALAR_RECORD_LEN {
            return Err(Error::Device(format!(
                "scalar record full, cannot allocate '{}'",
                label
            )));
        }
        let slot = ScalarSlot(self.next_slot);
        self.next_slot += 1;
        for device in &mut self.devices {
            device.write_scalar(slot, czero())?;
        }
        Ok(slot)
    }

    fn set_couple_constants(&mut self, cc: Arc<CoupleConstants<F>>) -> Result<()> {
        for device in &mut self.devices {
            device.finish()?;
        }
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
        {
            let _t = span(prof, "transfer");
            let v = self.vectors[input.index()].clone();
            v.read(&mut self.devices, &self.params, &mut self.host_in)?;
        }
        self.operator
            .apply(&self.host_in, &mut self.host_out, conjugate, prof)?;
        let _t = span(prof, "transfer");
        let v = self.vectors[output.index()].clone();
        v.write(&mut self.devices, &self.params, &self.host_out)
    }

    fn lin_comb(&mut self, out: VecId, terms: &[(VecId, Coeff<F>)]) -> Result<()> {
        if terms.is_empty() || terms.len() > 3 {
            return Err(Error::InvalidConfig(format!(
                "lin_comb takes 1 to 3 terms, got {}",
                terms.len()
            )));
        }
        self.broadcast_slots(terms)?;
        for proc in 0..self.devices.len() {
            let dev_terms: Vec<_> = terms
                .iter()
                .map(|&(v, c)| (self.vectors[v.index()].buffer(proc), c))
                .collect();
            let out_buf = self.vectors[out.index()].buffer(proc);
            self.devices[proc].lin_comb(out_buf, &dev_terms)?;
        }
        Ok(())
    }

    fn zero(&mut self, v: VecId) -> Result<()> {
        for proc in 0..self.devices.len() {
            let buf = self.vectors[v.index()].buffer(proc);
            self.devices[proc].zero(buf)?;
        }
        Ok(())
    }

    fn swap(&mut self, a: VecId, b: VecId) {
        self.vectors.swap(a.index(), b.index());
    }

    fn reduce(&mut self, reduction: Reduction, out: ScalarSlot) -> Result<()> {
        if self.devices.len() == 1 {
            let r = self.device_reduction(reduction, 0);
            return self.devices[0].reduce(r, out);
        }
        for proc in 0..self.devices.len() {
            let r = self.device_reduction(reduction, proc);
            self.devices[proc].reduce(r, PARTIAL_SLOT)?;
        }
        let mut sum = czero();
        for device in &mut self.devices {
            sum = sum + device.read_scalar(PARTIAL_SLOT)?;
        }
        self.devices[0].write_scalar(out, sum)
    }

    fn eval(&mut self, out: ScalarSlot, expr: ScalarExpr<F>) -> Result<()> {
        self.devices[0].eval(out, expr)
    }

    fn read_scalar(&mut self, slot: ScalarSlot) -> Result<C<F>> {
        self.devices[0].read_scalar(slot)
    }

    fn write_scalar(&mut self, slot: ScalarSlot, value: C<F>) -> Result<()> {
        self.devices[0].write_scalar(slot, value)
    }

    fn upload(&mut self, v: VecId, data: &[C<F>]) -> Result<()> {
        let dip = self.vectors[v.index()].clone();
        dip.write(&mut self.devices, &self.params, data)
    }

    fn download(&mut self, v: VecId) -> Result<Vec<C<F>>> {
        let dip = self.vectors[v.index()].clone();
        let mut out = vec![czero(); self.params.vec_size()];
        dip.read(&mut self.devices, &self.params, &mut out)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CpuBackend;
    use crate::device::HostDevice;
    use crate::operator::ScaledIdentity;
    use dipola_core::DipoleGeometry;
    use num_complex::Complex;

    fn setup(procs: usize) -> (DeviceBackend<f64>, CpuBackend<f64>, Vec<C<f64>>) {
        let params = Arc::new(
            DdaParams::new(DipoleGeometry::cuboid(2, 3, 5, 1.0), 1.0, procs, true).unwrap(),
        );
        let n = params.vec_size();
        let op = || Box::new(ScaledIdentity::new(n, Complex::new(0.5, 0.25)));
        let dev = DeviceBackend::new(params.clone(), HostDevice::boxed_set(procs), op()).unwrap();
        let cpu = CpuBackend::new(op());
        let mut data = vec![czero(); n];
        for i in 0..params.nv_count() {
            let t = i as f64;
            params.set(
                &mut data,
                i,
                [
                    Complex::new(t, 1.0),
                    Complex::new(-t, 0.5),
                    Complex::new(0.1 * t, -t),
                ],
            );
        }
        (dev, cpu, data)
    }

    #[test]
    fn test_reduction_sums_partials() {
        let (mut dev, mut cpu, data) = setup(3);
        let a = dev.alloc_vector("a").unwrap();
        let ca = cpu.alloc_vector("a").unwrap();
        dev.upload(a, &data).unwrap();
        cpu.upload(ca, &data).unwrap();
        let s = dev.alloc_scalar("s").unwrap();
        let cs = cpu.alloc_scalar("s").unwrap();
        let n_dev = dev.reduce_read(Reduction::Norm(a), s).unwrap();
        let n_cpu = cpu.reduce_read(Reduction::Norm(ca), cs).unwrap();
        assert!((n_dev - n_cpu).norm() < 1e-9 * n_cpu.norm());
        let d_dev = dev.reduce_read(Reduction::DotUnconj(a, a), s).unwrap();
        let d_cpu = cpu.reduce_read(Reduction::DotUnconj(ca, ca), cs).unwrap();
        assert!((d_dev - d_cpu).norm() < 1e-9 * d_cpu.norm());
    }

    #[test]
    fn test_slot_coefficients_reach_all_devices() {
        let (mut dev, _, data) = setup(3);
        let a = dev.alloc_vector("a").unwrap();
        let b = dev.alloc_vector("b").unwrap();
        dev.upload(a, &data).unwrap();
        let s = dev.alloc_scalar("s").unwrap();
        dev.write_scalar(s, Complex::new(0.0, 2.0)).unwrap();
        dev.lin_comb(b, &[(a, Coeff::Slot(s))]).unwrap();
        let out = dev.download(b).unwrap();
        for (o, d) in out.iter().zip(&data) {
            assert_eq!(*o, d * Complex::new(0.0, 2.0));
        }
    }

    #[test]
    fn test_apply_and_swap() {
        let (mut dev, _, data) = setup(2);
        let a = dev.alloc_vector("a").unwrap();
        let b = dev.alloc_vector("b").unwrap();
        dev.upload(a, &data).unwrap();
        dev.apply(a, b, true, None).unwrap();
        dev.swap(a, b);
        let out = dev.download(a).unwrap();
        assert_eq!(out[1], data[1] * Complex::new(0.5, -0.25));
        assert_eq!(dev.download(b).unwrap(), data);
    }

    #[test]
    fn test_scalar_record_exhaustion() {
        let (mut dev, _, _) = setup(1);
        for _ in 1..SCALAR_RECORD_LEN {
            dev.alloc_scalar("s").unwrap();
        }
        assert!(dev.alloc_scalar("overflow").is_err());
    }
}
