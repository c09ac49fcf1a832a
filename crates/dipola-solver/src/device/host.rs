//! Device emulated in host memory.

use super::{BufferId, ComputeDevice, DeviceReduction, SCALAR_RECORD_LEN};
use crate::backend::{Coeff, ScalarExpr, ScalarSlot};
use crate::error::{Error, Result};
use crate::lincomb::{self, Term};
use crate::scalar::{C, Real, czero, creal};

/// Synchronous device backed by host vectors.
///
/// Lets multi-device code paths run (and be tested) without GPUs.
pub struct HostDevice<F: Real> {
    name: String,
    buffers: Vec<Vec<C<F>>>,
    scalars: Vec<C<F>>,
}

impl<F: Real> HostDevice<F> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            buffers: Vec::new(),
            scalars: vec![czero(); SCALAR_RECORD_LEN],
        }
    }

    /// `count` emulated devices named `host0`, `host1`, ...
    pub fn boxed_set(count: usize) -> Vec<Box<dyn ComputeDevice<F>>> {
        (0..count)
            .map(|i| Box::new(HostDevice::new(format!("host{}", i))) as Box<dyn ComputeDevice<F>>)
            .collect()
    }

    fn buffer(&self, buf: BufferId) -> Result<&Vec<C<F>>> {
        self.buffers
            .get(buf.0)
            .ok_or_else(|| Error::Device(format!("{}: unknown buffer {}", self.name, buf.0)))
    }

    fn check_slot(&self, slot: ScalarSlot) -> Result<()> {
        if slot.index() < self.scalars.len() {
            Ok(())
        } else {
            Err(Error::Device(format!(
                "{}: scalar slot {} out of range",
                self.name,
                slot.index()
            )))
        }
    }

    fn coeff(&self, c: Coeff<F>) -> Result<C<F>> {
        match c {
            Coeff::Value(v) => Ok(v),
            Coeff::Slot(s) => {
                self.check_slot(s)?;
                Ok(self.scalars[s.index()])
            }
        }
    }
}

impl<F: Real> ComputeDevice<F> for HostDevice<F> {
    fn name(&self) -> &str {
        &self.name
    }

    fn alloc(&mut self, len: usize, _label: &str) -> Result<BufferId> {
        self.buffers.push(vec![czero(); len]);
        Ok(BufferId(self.buffers.len() - 1))
    }

    fn buffer_len(&self, buf: BufferId) -> usize {
        self.buffers.get(buf.0).map_or(0, Vec::len)
    }

    fn write(&mut self, buf: BufferId, offset: usize, data: &[C<F>]) -> Result<()> {
        let name = &self.name;
        let target = self
            .buffers
            .get_mut(buf.0)
            .and_then(|b| b.get_mut(offset..offset + data.len()))
            .ok_or_else(|| Error::Device(format!("{}: write out of bounds", name)))?;
        target.copy_from_slice(data);
        Ok(())
    }

    fn read(&mut self, buf: BufferId, offset: usize, out: &mut [C<F>]) -> Result<()> {
        let src = self
            .buffer(buf)?
            .get(offset..offset + out.len())
            .ok_or_else(|| Error::Device(format!("{}: read out of bounds", self.name)))?;
        out.copy_from_slice(src);
        Ok(())
    }

    fn zero(&mut self, buf: BufferId) -> Result<()> {
        self.buffer(buf)?;
        self.buffers[buf.0].fill(czero());
        Ok(())
    }

    fn lin_comb(&mut self, out: BufferId, terms: &[(BufferId, Coeff<F>)]) -> Result<()> {
        let coeffs = terms
            .iter()
            .map(|&(_, c)| self.coeff(c))
            .collect::<Result<Vec<_>>>()?;
        for &(b, _) in terms {
            if self.buffer(b)?.len() != self.buffer(out)?.len() {
                return Err(Error::Device(format!("{}: lin_comb length mismatch", self.name)));
            }
        }
        let mut dst = std::mem::take(&mut self.buffers[out.0]);
        let resolved: Vec<Term<'_, F>> = terms
            .iter()
            .zip(&coeffs)
            .map(|(&(b, _), &c)| {
                if b == out {
                    Term::Output(c)
                } else {
                    Term::Input(&self.buffers[b.0], c)
                }
            })
            .collect();
        lincomb::lin_comb(&mut dst, &resolved);
        drop(resolved);
        self.buffers[out.0] = dst;
        Ok(())
    }

    fn reduce(&mut self, reduction: DeviceReduction, out: ScalarSlot) -> Result<()> {
        self.check_slot(out)?;
        let value = match reduction {
            DeviceReduction::Norm(a) => creal(lincomb::norm(self.buffer(a)?)),
            DeviceReduction::Dot(a, b) => lincomb::dot_conj(self.buffer(a)?, self.buffer(b)?),
            DeviceReduction::DotUnconj(a, b) => {
                lincomb::dot_unconj(self.buffer(a)?, self.buffer(b)?)
            }
        };
        self.scalars[out.index()] = value;
        Ok(())
    }

    fn eval(&mut self, out: ScalarSlot, expr: ScalarExpr<F>) -> Result<()> {
        self.check_slot(out)?;
        let len = self.scalars.len();
        let scalars = &self.scalars;
        let value = expr.eval(|s| if s.index() < len { scalars[s.index()] } else { czero() });
        self.scalars[out.index()] = value;
        Ok(())
    }

    fn read_scalar(&mut self, slot: ScalarSlot) -> Result<C<F>> {
        self.check_slot(slot)?;
        Ok(self.scalars[slot.index()])
    }

    fn write_scalar(&mut self, slot: ScalarSlot, value: C<F>) -> Result<()> {
        self.check_slot(slot)?;
        self.scalars[slot.index()] = value;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex;

    #[test]
    fn test_write_read_offset() {
        let mut d = HostDevice::<f32>::new("h");
        let b = d.alloc(8, "b").unwrap();
        d.write(b, 4, &[Complex::new(1.0, 2.0); 3]).unwrap();
        let mut out = [czero(); 4];
        d.read(b, 3, &mut out).unwrap();
        assert_eq!(out[0], czero());
        assert_eq!(out[1], Complex::new(1.0, 2.0));
        assert!(d.write(b, 7, &[czero(); 2]).is_err());
    }

    #[test]
    fn test_slot_coefficients() {
        let mut d = HostDevice::<f64>::new("h");
        let a = d.alloc(2, "a").unwrap();
        d.write(a, 0, &[Complex::new(1.0, 0.0), Complex::new(2.0, 0.0)]).unwrap();
        let s = ScalarSlot::new(5);
        d.write_scalar(s, Complex::new(0.0, 1.0)).unwrap();
        d.lin_comb(a, &[(a, Coeff::Slot(s))]).unwrap();
        let mut out = [czero(); 2];
        d.read(a, 0, &mut out).unwrap();
        assert_eq!(out[1], Complex::new(0.0, 2.0));
        d.reduce(DeviceReduction::Norm(a), s).unwrap();
        assert_eq!(d.read_scalar(s).unwrap(), Complex::new(5.0, 0.0));
        assert!(d.read_scalar(ScalarSlot::new(SCALAR_RECORD_LEN as u32)).is_err());
    }
}
