//! Problem description from command-line flags and an optional JSON file.

use crate::backend::BackendKind;
use anyhow::{Context, Result, bail};
use clap::{Args, ValueEnum};
use dipola_core::{DdaParams, DipoleGeometry};
use dipola_solver::{SolverConfig, SolverKind};
use num_complex::Complex64;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Particle shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    Box,
    Sphere,
}

/// Floating-point precision of the solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    F32,
    F64,
}

#[derive(Debug, Clone, Args)]
pub struct ProblemArgs {
    /// Particle shape
    #[arg(long, value_enum, default_value_t = Shape::Box)]
    pub shape: Shape,

    /// Size in dipoles: NX[,NY,NZ] for a box, the diameter for a sphere
    #[arg(long, value_delimiter = ',', default_value = "16")]
    pub size: Vec<u32>,

    /// Wavelength
    #[arg(long, default_value_t = 6.283185307)]
    pub lambda: f64,

    /// Dipoles per wavelength
    #[arg(long, default_value_t = 10.0)]
    pub dpl: f64,

    /// Refractive index as RE[,IM]
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true, default_value = "1.5,0")]
    pub m: Vec<f64>,

    /// Iterative solver (qmr, bicgstab, bicg, cgnr)
    #[arg(long)]
    pub solver: Option<SolverKind>,

    /// Stop when the relative residual drops below 10^-EPS
    #[arg(long, default_value_t = 5.0)]
    pub eps: f64,

    /// Maximum number of iterations
    #[arg(long)]
    pub max_iter: Option<usize>,

    /// Precision of vectors and scalars
    #[arg(long, value_enum, default_value_t = Precision::F64)]
    pub precision: Precision,

    /// Where vector operations run
    #[arg(long, value_enum, default_value_t = BackendKind::Cpu)]
    pub backend: BackendKind,

    /// Number of devices for the host and wgpu backends
    #[arg(long, default_value_t = 1)]
    pub devices: usize,

    /// Show a progress line on stderr
    #[arg(long)]
    pub progress: bool,

    /// Solve for the second incident polarization as well
    #[arg(long)]
    pub both_pol: bool,

    /// JSON file with solver settings; flags take precedence
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl ProblemArgs {
    pub fn geometry(&self) -> Result<DipoleGeometry> {
        let grid_unit = self.grid_unit()?;
        let geometry = match (self.shape, self.size.as_slice()) {
            (Shape::Box, &[n]) => DipoleGeometry::cuboid(n, n, n, grid_unit),
            (Shape::Box, &[nx, ny, nz]) => DipoleGeometry::cuboid(nx, ny, nz, grid_unit),
            (Shape::Sphere, &[d]) => DipoleGeometry::sphere(d, grid_unit),
            (shape, size) => bail!("invalid size {:?} for shape {:?}", size, shape),
        };
        if geometry.nv_count() == 0 {
            bail!("particle contains no dipoles");
        }
        Ok(geometry)
    }

    pub fn grid_unit(&self) -> Result<f64> {
        if !(self.dpl > 0.0) {
            bail!("dipoles per wavelength must be positive, got {}", self.dpl);
        }
        Ok(self.lambda / self.dpl)
    }

    /// Number of vector partitions implied by the backend.
    pub fn procs(&self) -> usize {
        match self.backend {
            BackendKind::Cpu => 1,
            BackendKind::Host | BackendKind::Wgpu => self.devices.max(1),
        }
    }

    pub fn params(&self) -> Result<DdaParams> {
        DdaParams::new(self.geometry()?, self.lambda, self.procs(), true)
            .context("invalid simulation parameters")
    }

    pub fn refractive_index(&self) -> Result<Complex64> {
        match self.m.as_slice() {
            &[re] => Ok(Complex64::new(re, 0.0)),
            &[re, im] => Ok(Complex64::new(re, im)),
            other => bail!("refractive index takes one or two numbers, got {:?}", other),
        }
    }

    /// Target relative residual.
    pub fn epsilon(&self) -> f64 {
        10f64.powf(-self.eps)
    }

    /// Solver settings: file values, then flags.
    pub fn solver_config(&self) -> Result<SolverConfig> {
        let mut config = match &self.config {
            Some(path) => load_solver_config(path)?,
            None => SolverConfig::default(),
        };
        if let Some(kind) = self.solver {
            config.kind = kind;
        }
        if let Some(max_iter) = self.max_iter {
            config.max_iter = Some(max_iter);
        }
        config.progress |= self.progress;
        Ok(config)
    }
}

pub fn load_solver_config(path: &Path) -> Result<SolverConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
}
