//! WebGPU implementation of [`ComputeDevice`].
//!
//! Commands are recorded into one pending encoder and submitted when the
//! host needs to observe or write device memory. Host writes go through
//! `Queue::write_buffer`, which is ordered before the next submission, so
//! the pending encoder is flushed first to keep issue order.

use crate::context::WgpuContext;
use crate::error::WgpuError;
use crate::kernels::{
    Kernels, LinCombTerm, LinCombUniforms, MAX_REDUCE_GROUPS, MODE_OUTPUT, MODE_SLOT,
    ReduceUniforms, ScalarUniforms, dispatch_dims, reduce_groups,
};
use dipola_solver::device::{BufferId, DeviceReduction, SCALAR_RECORD_LEN};
use dipola_solver::{C, Coeff, ComputeDevice, Error, Result, ScalarExpr, ScalarSlot};
use num_complex::Complex;
use std::sync::Arc;
use wgpu::util::DeviceExt;

const ELEM_BYTES: u64 = 2 * std::mem::size_of::<f32>() as u64;

struct DeviceBuffer {
    buffer: wgpu::Buffer,
    len: usize,
}

/// Single-precision compute device on one WebGPU queue.
pub struct WgpuDevice {
    name: String,
    ctx: Arc<WgpuContext>,
    kernels: Kernels,
    buffers: Vec<DeviceBuffer>,
    scalars: wgpu::Buffer,
    partials: wgpu::Buffer,
    placeholder: wgpu::Buffer,
    encoder: Option<wgpu::CommandEncoder>,
}

impl WgpuDevice {
    pub fn new(ctx: Arc<WgpuContext>, name: impl Into<String>) -> Self {
        let device = &ctx.device;
        let kernels = Kernels::new(device);
        let scalars = storage_buffer(device, "scalar record", SCALAR_RECORD_LEN);
        let partials = storage_buffer(device, "reduce partials", MAX_REDUCE_GROUPS);
        let placeholder = storage_buffer(device, "placeholder", 1);
        let name = name.into();
        log::info!("WebGPU device {} on {}", name, ctx.adapter_name());
        Self {
            name,
            ctx,
            kernels,
            buffers: Vec::new(),
            scalars,
            partials,
            placeholder,
            encoder: None,
        }
    }

    /// `count` devices, assigned round-robin over the visible adapters.
    pub fn boxed_set(count: usize) -> Result<Vec<Box<dyn ComputeDevice<f32>>>> {
        let adapters = WgpuContext::adapter_count();
        if adapters == 0 {
            return Err(WgpuError::NoAdapter.into());
        }
        (0..count)
            .map(|i| {
                let ctx = WgpuContext::for_adapter(i % adapters)?;
                Ok(Box::new(WgpuDevice::new(Arc::new(ctx), format!("wgpu{}", i)))
                    as Box<dyn ComputeDevice<f32>>)
            })
            .collect()
    }

    fn buffer(&self, buf: BufferId) -> Result<&DeviceBuffer> {
        self.buffers
            .get(buf.0)
            .ok_or_else(|| Error::Device(format!("{}: unknown buffer {}", self.name, buf.0)))
    }

    fn check_slot(&self, slot: ScalarSlot) -> Result<u32> {
        if slot.index() < SCALAR_RECORD_LEN {
            Ok(slot.index() as u32)
        } else {
            Err(Error::Device(format!(
                "{}: scalar slot {} out of range",
                self.name,
                slot.index()
            )))
        }
    }

    fn flush(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.ctx.queue.submit(std::iter::once(encoder.finish()));
        }
    }

    fn uniform<T: bytemuck::Pod>(&self, label: &str, value: &T) -> wgpu::Buffer {
        self.ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::bytes_of(value),
                usage: wgpu::BufferUsages::UNIFORM,
            })
    }

    fn run_scalar_op(&mut self, uniforms: ScalarUniforms) {
        let params = self.uniform("scalar_op params", &uniforms);
        let bind_group = self.ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("scalar_op"),
            layout: &self.kernels.scalar_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: self.scalars.as_entire_binding(),
                },
            ],
        });
        let mut pass = pending(&mut self.encoder, &self.ctx.device).begin_compute_pass(
            &wgpu::ComputePassDescriptor {
                label: Some("scalar_op"),
                timestamp_writes: None,
            },
        );
        pass.set_pipeline(&self.kernels.scalar_op);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(1, 1, 1);
    }
}

fn pending<'a>(
    encoder: &'a mut Option<wgpu::CommandEncoder>,
    device: &wgpu::Device,
) -> &'a mut wgpu::CommandEncoder {
    encoder.get_or_insert_with(|| {
        device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("dipola encoder"),
        })
    })
}

/// Blocking copy of `out.len()` elements of `src` starting at `offset`.
fn read_back(
    ctx: &WgpuContext,
    src: &wgpu::Buffer,
    offset: usize,
    out: &mut [C<f32>],
) -> Result<()> {
    let size = out.len() as u64 * ELEM_BYTES;
    let device = &ctx.device;
    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("readback"),
        size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("readback encoder"),
    });
    encoder.copy_buffer_to_buffer(src, offset as u64 * ELEM_BYTES, &staging, 0, size);
    ctx.queue.submit(std::iter::once(encoder.finish()));

    let slice = staging.slice(..);
    let (sender, receiver) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    device.poll(wgpu::Maintain::Wait);
    receiver
        .recv()
        .map_err(|e| WgpuError::Buffer(format!("Failed to receive map result: {}", e)))?
        .map_err(|e| WgpuError::Buffer(format!("Buffer mapping failed: {:?}", e)))?;

    let data = slice.get_mapped_range();
    let values: &[[f32; 2]] = bytemuck::cast_slice(&data);
    for (o, v) in out.iter_mut().zip(values) {
        *o = Complex::new(v[0], v[1]);
    }
    drop(data);
    staging.unmap();
    Ok(())
}

fn storage_buffer(device: &wgpu::Device, label: &str, len: usize) -> wgpu::Buffer {
    // zero-length bindings are invalid
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: len.max(1) as u64 * ELEM_BYTES,
        usage: wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_SRC
            | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

fn pack(data: &[C<f32>]) -> Vec<[f32; 2]> {
    data.iter().map(|c| [c.re, c.im]).collect()
}

impl ComputeDevice<f32> for WgpuDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn alloc(&mut self, len: usize, label: &str) -> Result<BufferId> {
        let buffer = storage_buffer(&self.ctx.device, label, len);
        self.buffers.push(DeviceBuffer { buffer, len });
        Ok(BufferId(self.buffers.len() - 1))
    }

    fn buffer_len(&self, buf: BufferId) -> usize {
        self.buffers.get(buf.0).map_or(0, |b| b.len)
    }

    fn write(&mut self, buf: BufferId, offset: usize, data: &[C<f32>]) -> Result<()> {
        if offset + data.len() > self.buffer(buf)?.len {
            return Err(Error::Device(format!("{}: write out of bounds", self.name)));
        }
        if data.is_empty() {
            return Ok(());
        }
        self.flush();
        self.ctx.queue.write_buffer(
            &self.buffers[buf.0].buffer,
            offset as u64 * ELEM_BYTES,
            bytemuck::cast_slice(&pack(data)),
        );
        Ok(())
    }

    fn read(&mut self, buf: BufferId, offset: usize, out: &mut [C<f32>]) -> Result<()> {
        if offset + out.len() > self.buffer(buf)?.len {
            return Err(Error::Device(format!("{}: read out of bounds", self.name)));
        }
        if out.is_empty() {
            return Ok(());
        }
        self.flush();
        read_back(&self.ctx, &self.buffers[buf.0].buffer, offset, out)
    }

    fn zero(&mut self, buf: BufferId) -> Result<()> {
        self.buffer(buf)?;
        pending(&mut self.encoder, &self.ctx.device).clear_buffer(
            &self.buffers[buf.0].buffer,
            0,
            None,
        );
        Ok(())
    }

    fn lin_comb(&mut self, out: BufferId, terms: &[(BufferId, Coeff<f32>)]) -> Result<()> {
        if terms.is_empty() || terms.len() > 3 {
            return Err(Error::Device(format!(
                "{}: lin_comb takes 1 to 3 terms, got {}",
                self.name,
                terms.len()
            )));
        }
        let n = self.buffer(out)?.len;
        let mut uniforms = LinCombUniforms {
            n: n as u32,
            nterms: terms.len() as u32,
            _pad: [0; 2],
            terms: [LinCombTerm::default(); 3],
        };
        let mut inputs = [&self.placeholder; 3];
        for (k, &(b, c)) in terms.iter().enumerate() {
            if self.buffer(b)?.len != n {
                return Err(Error::Device(format!("{}: lin_comb length mismatch", self.name)));
            }
            let term = &mut uniforms.terms[k];
            match c {
                Coeff::Value(v) => term.coeff = [v.re, v.im],
                Coeff::Slot(s) => {
                    term.slot = self.check_slot(s)?;
                    term.mode |= MODE_SLOT;
                }
            }
            if b == out {
                term.mode |= MODE_OUTPUT;
            } else {
                inputs[k] = &self.buffers[b.0].buffer;
            }
        }
        if n == 0 {
            return Ok(());
        }

        let params = self.uniform("lin_comb params", &uniforms);
        let bind_group = self.ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("lin_comb"),
            layout: &self.kernels.lin_comb_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: self.scalars.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.buffers[out.0].buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: inputs[0].as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: inputs[1].as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: inputs[2].as_entire_binding(),
                },
            ],
        });
        let (x, y) = dispatch_dims(n);
        let mut pass = pending(&mut self.encoder, &self.ctx.device).begin_compute_pass(
            &wgpu::ComputePassDescriptor {
                label: Some("lin_comb"),
                timestamp_writes: None,
            },
        );
        pass.set_pipeline(&self.kernels.lin_comb);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(x, y, 1);
        Ok(())
    }

    fn reduce(&mut self, reduction: DeviceReduction, out: ScalarSlot) -> Result<()> {
        let out_slot = self.check_slot(out)?;
        let (a, b, mode) = match reduction {
            DeviceReduction::Norm(a) => (a, a, 0),
            DeviceReduction::Dot(a, b) => (a, b, 1),
            DeviceReduction::DotUnconj(a, b) => (a, b, 2),
        };
        let n = self.buffer(a)?.len;
        if self.buffer(b)?.len != n {
            return Err(Error::Device(format!("{}: reduce length mismatch", self.name)));
        }
        if n == 0 {
            self.run_scalar_op(ScalarUniforms {
                op: 0,
                out_slot,
                a: 0,
                b: 0,
                value: [0.0; 2],
                _pad: [0.0; 2],
            });
            return Ok(());
        }

        let groups = reduce_groups(n);
        let params = self.uniform(
            "reduce params",
            &ReduceUniforms {
                n: n as u32,
                mode,
                out_slot,
                groups,
            },
        );
        let bind_group = self.ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("reduce"),
            layout: &self.kernels.reduce_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: self.buffers[a.0].buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.buffers[b.0].buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: self.partials.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: self.scalars.as_entire_binding(),
                },
            ],
        });
        let encoder = pending(&mut self.encoder, &self.ctx.device);
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("reduce partial"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.kernels.reduce_partial);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(groups, 1, 1);
        }
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("reduce combine"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.kernels.reduce_combine);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(1, 1, 1);
        Ok(())
    }

    fn eval(&mut self, out: ScalarSlot, expr: ScalarExpr<f32>) -> Result<()> {
        let out_slot = self.check_slot(out)?;
        let (op, a, b, value) = match expr {
            ScalarExpr::Value(v) => (0, out, out, [v.re, v.im]),
            ScalarExpr::Copy(a) => (1, a, a, [0.0; 2]),
            ScalarExpr::Neg(a) => (2, a, a, [0.0; 2]),
            ScalarExpr::Mul(a, b) => (3, a, b, [0.0; 2]),
            ScalarExpr::NegMul(a, b) => (4, a, b, [0.0; 2]),
            ScalarExpr::Div(a, b) => (5, a, b, [0.0; 2]),
        };
        let a = self.check_slot(a)?;
        let b = self.check_slot(b)?;
        self.run_scalar_op(ScalarUniforms {
            op,
            out_slot,
            a,
            b,
            value,
            _pad: [0.0; 2],
        });
        Ok(())
    }

    fn read_scalar(&mut self, slot: ScalarSlot) -> Result<C<f32>> {
        let index = self.check_slot(slot)? as usize;
        let mut out = [Complex::new(0.0, 0.0)];
        self.flush();
        read_back(&self.ctx, &self.scalars, index, &mut out)?;
        Ok(out[0])
    }

    fn write_scalar(&mut self, slot: ScalarSlot, value: C<f32>) -> Result<()> {
        let index = self.check_slot(slot)? as u64;
        self.flush();
        self.ctx.queue.write_buffer(
            &self.scalars,
            index * ELEM_BYTES,
            bytemuck::cast_slice(&[[value.re, value.im]]),
        );
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.flush();
        self.ctx.device.poll(wgpu::Maintain::Wait);
        Ok(())
    }
}
