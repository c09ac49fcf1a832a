//! Compute pipelines and their uniform layouts.

use bytemuck::{Pod, Zeroable};

pub(crate) const WORKGROUP_SIZE: usize = 256;

/// Upper bound on workgroups in the first reduction pass.
pub(crate) const MAX_REDUCE_GROUPS: usize = 1024;

const MAX_DISPATCH_X: usize = 65535;

pub(crate) const MODE_SLOT: u32 = 1;
pub(crate) const MODE_OUTPUT: u32 = 2;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub(crate) struct LinCombTerm {
    pub coeff: [f32; 2],
    pub slot: u32,
    pub mode: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct LinCombUniforms {
    pub n: u32,
    pub nterms: u32,
    pub _pad: [u32; 2],
    pub terms: [LinCombTerm; 3],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct ReduceUniforms {
    pub n: u32,
    pub mode: u32,
    pub out_slot: u32,
    pub groups: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct ScalarUniforms {
    pub op: u32,
    pub out_slot: u32,
    pub a: u32,
    pub b: u32,
    pub value: [f32; 2],
    pub _pad: [f32; 2],
}

pub(crate) struct Kernels {
    pub lin_comb: wgpu::ComputePipeline,
    pub lin_comb_layout: wgpu::BindGroupLayout,
    pub reduce_partial: wgpu::ComputePipeline,
    pub reduce_combine: wgpu::ComputePipeline,
    pub reduce_layout: wgpu::BindGroupLayout,
    pub scalar_op: wgpu::ComputePipeline,
    pub scalar_layout: wgpu::BindGroupLayout,
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn pipeline(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::BindGroupLayout,
    module: &wgpu::ShaderModule,
    entry_point: &str,
) -> wgpu::ComputePipeline {
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        module,
        entry_point: Some(entry_point),
        compilation_options: Default::default(),
        cache: None,
    })
}

fn shader(device: &wgpu::Device, label: &str, source: &'static str) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    })
}

impl Kernels {
    pub fn new(device: &wgpu::Device) -> Self {
        let lin_comb_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("lin_comb layout"),
            entries: &[
                uniform_entry(0),
                storage_entry(1, true),
                storage_entry(2, false),
                storage_entry(3, true),
                storage_entry(4, true),
                storage_entry(5, true),
            ],
        });
        let reduce_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("reduce layout"),
            entries: &[
                uniform_entry(0),
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, false),
                storage_entry(4, false),
            ],
        });
        let scalar_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("scalar_op layout"),
            entries: &[uniform_entry(0), storage_entry(1, false)],
        });

        let lin_comb_src = shader(device, "lin_comb", include_str!("shaders/lin_comb.wgsl"));
        let reduce_src = shader(device, "reduce", include_str!("shaders/reduce.wgsl"));
        let scalar_src = shader(device, "scalar_op", include_str!("shaders/scalar_op.wgsl"));

        Self {
            lin_comb: pipeline(device, "lin_comb", &lin_comb_layout, &lin_comb_src, "main"),
            reduce_partial: pipeline(
                device,
                "reduce partial",
                &reduce_layout,
                &reduce_src,
                "partial_sums",
            ),
            reduce_combine: pipeline(device, "reduce combine", &reduce_layout, &reduce_src, "combine"),
            scalar_op: pipeline(device, "scalar_op", &scalar_layout, &scalar_src, "main"),
            lin_comb_layout,
            reduce_layout,
            scalar_layout,
        }
    }
}

/// Workgroup grid covering `n` elements; rows of at most 65535 groups.
pub(crate) fn dispatch_dims(n: usize) -> (u32, u32) {
    let groups = n.div_ceil(WORKGROUP_SIZE).max(1);
    let x = groups.min(MAX_DISPATCH_X);
    (x as u32, groups.div_ceil(x) as u32)
}

pub(crate) fn reduce_groups(n: usize) -> u32 {
    n.div_ceil(WORKGROUP_SIZE).clamp(1, MAX_REDUCE_GROUPS) as u32
}
