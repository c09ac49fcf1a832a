//! Compute devices and multi-device vectors.
//!
//! A [`ComputeDevice`] is one in-order command queue with its own buffers
//! and a fixed-length scalar record. [`DipVector`] spreads a dipole vector
//! over several devices in z-slabs, and [`DeviceBackend`] drives a set of
//! devices as one [`VectorBackend`](crate::backend::VectorBackend):
//! scalars live on device 0, linear combinations run on every device, and
//! reductions combine per-device partial sums on the host in device order.
//!
//! # Module Structure
//!
//! - [`host`]: device emulated in host memory
//! - [`dipvector`]: slab-partitioned vectors
//! - [`backend`]: multi-device `VectorBackend`

pub mod backend;
pub mod dipvector;
pub mod host;

pub use backend::DeviceBackend;
pub use dipvector::DipVector;
pub use host::HostDevice;

use crate::backend::{Coeff, ScalarExpr, ScalarSlot};
use crate::error::Result;
use crate::scalar::{C, Real};

/// Number of complex entries in each device's scalar record.
pub const SCALAR_RECORD_LEN: usize = 64;

/// Slot reserved for per-device partial reductions.
pub const PARTIAL_SLOT: ScalarSlot = ScalarSlot(0);

/// Handle to a buffer on one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub usize);

/// Reduction over device buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceReduction {
    Norm(BufferId),
    Dot(BufferId, BufferId),
    DotUnconj(BufferId, BufferId),
}

/// One device with an in-order queue.
///
/// Only [`read`](ComputeDevice::read), [`read_scalar`](ComputeDevice::read_scalar)
/// and [`finish`](ComputeDevice::finish) block; every other call may return
/// before the work has executed.
pub trait ComputeDevice<F: Real>: Send {
    fn name(&self) -> &str;

    /// Allocate a zeroed buffer of `len` complex elements.
    fn alloc(&mut self, len: usize, label: &str) -> Result<BufferId>;

    /// Length of a buffer in complex elements.
    fn buffer_len(&self, buf: BufferId) -> usize;

    /// Copy host data into `buf` starting at element `offset`.
    fn write(&mut self, buf: BufferId, offset: usize, data: &[C<F>]) -> Result<()>;

    /// Blocking copy of `out.len()` elements starting at `offset`.
    fn read(&mut self, buf: BufferId, offset: usize, out: &mut [C<F>]) -> Result<()>;

    fn zero(&mut self, buf: BufferId) -> Result<()>;

    /// `out = Σ cᵢ bufᵢ`; slot coefficients are read from this device's record.
    fn lin_comb(&mut self, out: BufferId, terms: &[(BufferId, Coeff<F>)]) -> Result<()>;

    /// Reduce into a slot of this device's record.
    fn reduce(&mut self, reduction: DeviceReduction, out: ScalarSlot) -> Result<()>;

    fn eval(&mut self, out: ScalarSlot, expr: ScalarExpr<F>) -> Result<()>;

    /// Blocking read of one slot.
    fn read_scalar(&mut self, slot: ScalarSlot) -> Result<C<F>>;

    fn write_scalar(&mut self, slot: ScalarSlot, value: C<F>) -> Result<()>;

    /// Wait for all queued work.
    fn finish(&mut self) -> Result<()>;
}
