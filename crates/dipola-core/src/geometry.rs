//! Dipole lattice geometry.
//!
//! A particle is a set of occupied cells on a cubic grid. Each occupied
//! cell carries one dipole and a material index into the coupling
//! constant table.

use crate::error::{Error, Result};
use nalgebra::Vector3;

/// Dipoles placed on a cubic grid.
#[derive(Debug, Clone, PartialEq)]
pub struct DipoleGeometry {
    box_size: Vector3<u32>,
    grid_unit: f64,
    positions: Vec<Vector3<u32>>,
    material_indices: Vec<u8>,
    mat_count: usize,
}

impl DipoleGeometry {
    /// Create an empty geometry with the given grid spacing.
    pub fn new(grid_unit: f64) -> Self {
        Self {
            box_size: Vector3::zeros(),
            grid_unit,
            positions: Vec::new(),
            material_indices: Vec::new(),
            mat_count: 0,
        }
    }

    /// Solid rectangular block of `nx * ny * nz` dipoles of material 0.
    pub fn cuboid(nx: u32, ny: u32, nz: u32, grid_unit: f64) -> Self {
        let mut geometry = Self::new(grid_unit);
        for z in 0..nz {
            for y in 0..ny {
                for x in 0..nx {
                    geometry.add_dipole(Vector3::new(x, y, z), 0);
                }
            }
        }
        geometry
    }

    /// Sphere inscribed in a cube of `diameter` cells, material 0.
    ///
    /// A cell is occupied when its center lies inside the sphere.
    pub fn sphere(diameter: u32, grid_unit: f64) -> Self {
        let mut geometry = Self::new(grid_unit);
        let r = diameter as f64 / 2.0;
        let r2 = r * r;
        for z in 0..diameter {
            for y in 0..diameter {
                for x in 0..diameter {
                    let dx = x as f64 + 0.5 - r;
                    let dy = y as f64 + 0.5 - r;
                    let dz = z as f64 + 0.5 - r;
                    if dx * dx + dy * dy + dz * dz <= r2 {
                        geometry.add_dipole(Vector3::new(x, y, z), 0);
                    }
                }
            }
        }
        geometry.normalize();
        geometry
    }

    /// Append a dipole, growing the bounding box and material count.
    pub fn add_dipole(&mut self, position: Vector3<u32>, material: u8) {
        for axis in 0..3 {
            self.box_size[axis] = self.box_size[axis].max(position[axis] + 1);
        }
        self.mat_count = self.mat_count.max(material as usize + 1);
        self.positions.push(position);
        self.material_indices.push(material);
    }

    /// Shift all dipoles so the minimum coordinate on each axis is zero.
    pub fn normalize(&mut self) {
        if self.positions.is_empty() {
            return;
        }

        let mut min = Vector3::repeat(u32::MAX);
        for p in &self.positions {
            for axis in 0..3 {
                min[axis] = min[axis].min(p[axis]);
            }
        }

        if min != Vector3::zeros() {
            for p in &mut self.positions {
                *p -= min;
            }
            self.box_size -= min;
        }
    }

    /// Stable sort of the dipoles by z coordinate.
    ///
    /// The slab partition of [`DdaParams`](crate::DdaParams) requires this order.
    pub fn sort_by_z(&mut self) {
        let mut order: Vec<usize> = (0..self.positions.len()).collect();
        order.sort_by_key(|&i| self.positions[i].z);
        self.positions = order.iter().map(|&i| self.positions[i]).collect();
        self.material_indices = order.iter().map(|&i| self.material_indices[i]).collect();
    }

    /// Validate the internal invariants.
    pub fn check(&self) -> Result<()> {
        if self.positions.len() != self.material_indices.len() {
            return Err(Error::InvalidGeometry(format!(
                "{} positions but {} material indices",
                self.positions.len(),
                self.material_indices.len()
            )));
        }
        for (i, p) in self.positions.iter().enumerate() {
            if (0..3).any(|axis| p[axis] >= self.box_size[axis]) {
                return Err(Error::InvalidGeometry(format!(
                    "dipole {} at ({}, {}, {}) outside box ({}, {}, {})",
                    i, p.x, p.y, p.z, self.box_size.x, self.box_size.y, self.box_size.z
                )));
            }
        }
        if let Some(&m) = self
            .material_indices
            .iter()
            .find(|&&m| m as usize >= self.mat_count)
        {
            return Err(Error::MaterialOutOfRange {
                index: m as usize,
                count: self.mat_count,
            });
        }
        if !(self.grid_unit > 0.0) {
            return Err(Error::InvalidGeometry(format!(
                "grid unit must be positive, got {}",
                self.grid_unit
            )));
        }
        Ok(())
    }

    /// Number of dipoles.
    pub fn nv_count(&self) -> usize {
        self.positions.len()
    }

    /// Bounding box in grid cells.
    pub fn box_size(&self) -> Vector3<u32> {
        self.box_size
    }

    /// Grid spacing.
    pub fn grid_unit(&self) -> f64 {
        self.grid_unit
    }

    /// Volume of one grid cell.
    pub fn grid_unit_vol(&self) -> f64 {
        self.grid_unit * self.grid_unit * self.grid_unit
    }

    pub fn positions(&self) -> &[Vector3<u32>] {
        &self.positions
    }

    pub fn material_indices(&self) -> &[u8] {
        &self.material_indices
    }

    pub fn material_index(&self, i: usize) -> u8 {
        self.material_indices[i]
    }

    pub fn mat_count(&self) -> usize {
        self.mat_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cuboid_counts() {
        let g = DipoleGeometry::cuboid(2, 3, 4, 1.0);
        assert_eq!(g.nv_count(), 24);
        assert_eq!(g.box_size(), Vector3::new(2, 3, 4));
        assert_eq!(g.mat_count(), 1);
        g.check().unwrap();
    }

    #[test]
    fn test_normalize_shifts_box() {
        let mut g = DipoleGeometry::new(0.5);
        g.add_dipole(Vector3::new(3, 4, 5), 0);
        g.add_dipole(Vector3::new(4, 4, 7), 1);
        g.normalize();
        assert_eq!(g.positions()[0], Vector3::new(0, 0, 0));
        assert_eq!(g.positions()[1], Vector3::new(1, 0, 2));
        assert_eq!(g.box_size(), Vector3::new(2, 1, 3));
        assert_eq!(g.mat_count(), 2);
        g.check().unwrap();
    }

    #[test]
    fn test_sort_by_z_keeps_materials() {
        let mut g = DipoleGeometry::new(1.0);
        g.add_dipole(Vector3::new(0, 0, 2), 1);
        g.add_dipole(Vector3::new(0, 0, 0), 0);
        g.add_dipole(Vector3::new(1, 0, 1), 2);
        g.sort_by_z();
        let zs: Vec<u32> = g.positions().iter().map(|p| p.z).collect();
        assert_eq!(zs, vec![0, 1, 2]);
        assert_eq!(g.material_indices(), &[0, 2, 1]);
    }

    #[test]
    fn test_sphere_is_symmetric() {
        let g = DipoleGeometry::sphere(6, 1.0);
        assert!(g.nv_count() > 0);
        assert!(g.nv_count() < 216);
        assert_eq!(g.box_size(), Vector3::new(6, 6, 6));
        g.check().unwrap();
    }

    #[test]
    fn test_check_rejects_bad_grid_unit() {
        let g = DipoleGeometry::cuboid(1, 1, 1, 0.0);
        assert!(g.check().is_err());
    }
}
