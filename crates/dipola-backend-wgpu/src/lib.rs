//! WebGPU compute device for the dipola Krylov solvers.
//!
//! [`WgpuDevice`] implements [`ComputeDevice<f32>`](dipola_solver::ComputeDevice):
//! vectors and the scalar record live in storage buffers, and linear
//! combinations, reductions and scalar arithmetic run as compute shaders
//! on the device's queue. Most GPUs lack `f64`, so only single precision
//! is offered.

pub mod context;
pub mod device;
pub mod error;
mod kernels;

pub use context::WgpuContext;
pub use device::WgpuDevice;
pub use error::{Result, WgpuError};
