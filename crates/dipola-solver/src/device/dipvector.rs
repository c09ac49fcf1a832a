//! Dipole vectors partitioned across devices.

use super::{BufferId, ComputeDevice};
use crate::error::{Error, Result};
use crate::scalar::{C, Real, czero};
use dipola_core::DdaParams;

/// One buffer per device; device `i` holds the z-slab of dipoles
/// `local_vec0(i) .. local_vec0(i) + local_nv_count(i)` in the three-block
/// layout with stride `local_vec_stride(i)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DipVector {
    buffers: Vec<BufferId>,
}

impl DipVector {
    /// Allocate a zeroed vector on every device.
    pub fn new<F: Real>(
        devices: &mut [Box<dyn ComputeDevice<F>>],
        params: &DdaParams,
        label: &str,
    ) -> Result<Self> {
        if devices.len() != params.procs() {
            return Err(Error::InvalidConfig(format!(
                "{} devices for a {}-way partition",
                devices.len(),
                params.procs()
            )));
        }
        let buffers = devices
            .iter_mut()
            .enumerate()
            .map(|(i, d)| d.alloc(params.local_vec_size(i), label))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { buffers })
    }

    pub fn buffer(&self, proc: usize) -> BufferId {
        self.buffers[proc]
    }

    pub fn procs(&self) -> usize {
        self.buffers.len()
    }

    /// Scatter a host vector (global padded layout) to the devices.
    pub fn write<F: Real>(
        &self,
        devices: &mut [Box<dyn ComputeDevice<F>>],
        params: &DdaParams,
        data: &[C<F>],
    ) -> Result<()> {
        params.check_len(data.len())?;
        for (i, device) in devices.iter_mut().enumerate() {
            let n = params.local_nv_count(i);
            if n == 0 {
                continue;
            }
            let v0 = params.local_vec0(i);
            for j in 0..3 {
                let start = v0 + params.vec_stride() * j;
                device.write(
                    self.buffers[i],
                    params.local_vec_stride(i) * j,
                    &data[start..start + n],
                )?;
            }
        }
        Ok(())
    }

    /// Gather into a host vector (global padded layout); padding is zeroed.
    pub fn read<F: Real>(
        &self,
        devices: &mut [Box<dyn ComputeDevice<F>>],
        params: &DdaParams,
        out: &mut [C<F>],
    ) -> Result<()> {
        params.check_len(out.len())?;
        out.fill(czero());
        for (i, device) in devices.iter_mut().enumerate() {
            let n = params.local_nv_count(i);
            if n == 0 {
                continue;
            }
            let v0 = params.local_vec0(i);
            for j in 0..3 {
                let start = v0 + params.vec_stride() * j;
                device.read(
                    self.buffers[i],
                    params.local_vec_stride(i) * j,
                    &mut out[start..start + n],
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::HostDevice;
    use dipola_core::DipoleGeometry;
    use num_complex::Complex;

    #[test]
    fn test_scatter_gather_across_slabs() {
        let params = DdaParams::new(DipoleGeometry::cuboid(3, 3, 4, 1.0), 1.0, 3, true).unwrap();
        let mut devices = HostDevice::<f64>::boxed_set(3);
        let v = DipVector::new(&mut devices, &params, "v").unwrap();

        let mut data = vec![czero(); params.vec_size()];
        for i in 0..params.nv_count() {
            params.set(
                &mut data,
                i,
                [
                    Complex::new(i as f64, 0.0),
                    Complex::new(0.0, i as f64),
                    Complex::new(i as f64, i as f64),
                ],
            );
        }
        v.write(&mut devices, &params, &data).unwrap();

        // device 1 starts at its own offset with its own stride
        let v0 = params.local_vec0(1);
        let mut first = [czero(); 1];
        devices[1]
            .read(v.buffer(1), params.local_vec_stride(1), &mut first)
            .unwrap();
        assert_eq!(first[0], Complex::new(0.0, v0 as f64));

        let mut back = vec![Complex::new(9.0, 9.0); params.vec_size()];
        v.read(&mut devices, &params, &mut back).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn test_device_count_must_match() {
        let params = DdaParams::new(DipoleGeometry::cuboid(1, 1, 2, 1.0), 1.0, 2, true).unwrap();
        let mut devices = HostDevice::<f32>::boxed_set(1);
        assert!(DipVector::new(&mut devices, &params, "v").is_err());
    }
}
