//! Compute backend selection.

use anyhow::Result;
use clap::ValueEnum;
use dipola_solver::{ComputeDevice, HostDevice, Real};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Contiguous host vectors
    Cpu,
    /// Host-emulated devices with z-slab partitioned vectors
    Host,
    /// WebGPU devices (single precision, `wgpu` feature)
    Wgpu,
}

/// Device construction for one precision.
pub trait DevicePrecision: Real {
    fn wgpu_devices(count: usize) -> Result<Vec<Box<dyn ComputeDevice<Self>>>>;
}

impl DevicePrecision for f32 {
    fn wgpu_devices(count: usize) -> Result<Vec<Box<dyn ComputeDevice<f32>>>> {
        #[cfg(feature = "wgpu")]
        {
            Ok(dipola_backend_wgpu::WgpuDevice::boxed_set(count)?)
        }
        #[cfg(not(feature = "wgpu"))]
        {
            let _ = count;
            anyhow::bail!("wgpu support not compiled in; rebuild with --features wgpu")
        }
    }
}

impl DevicePrecision for f64 {
    fn wgpu_devices(_count: usize) -> Result<Vec<Box<dyn ComputeDevice<f64>>>> {
        anyhow::bail!("the wgpu backend only supports --precision f32")
    }
}

/// Devices for a partitioned backend, or `None` for the CPU backend.
pub fn create_devices<F: DevicePrecision>(
    kind: BackendKind,
    count: usize,
) -> Result<Option<Vec<Box<dyn ComputeDevice<F>>>>> {
    match kind {
        BackendKind::Cpu => Ok(None),
        BackendKind::Host => Ok(Some(HostDevice::<F>::boxed_set(count))),
        BackendKind::Wgpu => F::wgpu_devices(count).map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_devices() {
        assert!(create_devices::<f64>(BackendKind::Cpu, 4).unwrap().is_none());
        let devices = create_devices::<f32>(BackendKind::Host, 3).unwrap().unwrap();
        assert_eq!(devices.len(), 3);
        assert_eq!(devices[2].name(), "host2");
        assert!(create_devices::<f64>(BackendKind::Wgpu, 1).is_err());
    }
}
