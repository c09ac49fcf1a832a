//! Adapter and device setup.

use crate::error::{Result, WgpuError};

/// One logical WebGPU device and its queue.
pub struct WgpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    info: wgpu::AdapterInfo,
}

impl WgpuContext {
    /// Open the high-performance adapter.
    pub fn new() -> Result<Self> {
        let instance = Self::instance();
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            compatible_surface: None,
        }))
        .ok_or(WgpuError::NoAdapter)?;
        Self::from_adapter(adapter)
    }

    /// Open the adapter at `index` in enumeration order.
    pub fn for_adapter(index: usize) -> Result<Self> {
        let adapter = Self::instance()
            .enumerate_adapters(wgpu::Backends::all())
            .into_iter()
            .nth(index)
            .ok_or(WgpuError::NoAdapter)?;
        Self::from_adapter(adapter)
    }

    /// Number of adapters visible to this process.
    pub fn adapter_count() -> usize {
        Self::instance()
            .enumerate_adapters(wgpu::Backends::all())
            .len()
    }

    pub fn is_available() -> bool {
        let instance = Self::instance();
        pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default()))
            .is_some()
    }

    pub fn adapter_name(&self) -> &str {
        &self.info.name
    }

    fn instance() -> wgpu::Instance {
        wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        })
    }

    fn from_adapter(adapter: wgpu::Adapter) -> Result<Self> {
        let info = adapter.get_info();
        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("dipola device"),
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        ))
        .map_err(|e| WgpuError::DeviceRequest(e.to_string()))?;
        log::info!("Opened WebGPU adapter {} ({:?})", info.name, info.backend);
        Ok(Self {
            device,
            queue,
            info,
        })
    }
}
