//! JSON run reports and warm-start input.

use crate::backend::BackendKind;
use crate::config::{Precision, Shape};
use anyhow::{Context, Result, bail};
use dipola_core::DdaParams;
use dipola_solver::{C, Real, SolverKind};
use num_complex::Complex;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

/// One solved incident polarization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolutionRecord {
    /// Incident polarization direction ("x" or "y").
    pub incident: String,
    pub iterations: usize,
    pub start: String,
    pub relative_error: f64,
    pub elapsed_s: f64,
    /// Relative error after every iteration.
    pub history: Vec<f64>,
    /// Per-dipole polarization `[[re, im]; 3]` in dipole order.
    pub polarization: Vec<[[f64; 2]; 3]>,
}

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub solver: SolverKind,
    pub backend: BackendKind,
    pub precision: Precision,
    pub shape: Shape,
    pub nv_count: usize,
    pub lambda: f64,
    pub grid_unit: f64,
    pub refractive_index: [f64; 2],
    pub epsilon: f64,
    pub solutions: Vec<SolutionRecord>,
}

#[derive(Debug, Deserialize)]
struct PolarizationFile {
    solutions: Vec<SolutionRecord>,
}

/// Per-dipole values from a padded dipole vector.
pub fn pack_polarization<F: Real>(params: &DdaParams, pol: &[C<F>]) -> Vec<[[f64; 2]; 3]> {
    (0..params.nv_count())
        .map(|i| params.get(pol, i).map(|c| [c.re.as_f64(), c.im.as_f64()]))
        .collect()
}

/// Padded dipole vector from per-dipole values.
pub fn unpack_polarization<F: Real>(
    params: &DdaParams,
    values: &[[[f64; 2]; 3]],
) -> Result<Vec<C<F>>> {
    if values.len() != params.nv_count() {
        bail!(
            "warm start has {} dipoles, the particle has {}",
            values.len(),
            params.nv_count()
        );
    }
    let mut out = vec![Complex::new(F::zero(), F::zero()); params.vec_size()];
    for (i, v) in values.iter().enumerate() {
        params.set(&mut out, i, v.map(|[re, im]| Complex::new(F::lit(re), F::lit(im))));
    }
    Ok(out)
}

/// Solutions of an earlier run, keyed by incident polarization.
pub fn load_warm_start(path: &Path) -> Result<Vec<SolutionRecord>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading warm start {}", path.display()))?;
    let file: PolarizationFile = serde_json::from_str(&text)
        .with_context(|| format!("parsing warm start {}", path.display()))?;
    Ok(file.solutions)
}

/// Write `report` as pretty JSON to `path`, or to stdout.
pub fn write_report(report: &RunReport, path: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    match path {
        Some(p) => {
            std::fs::write(p, json + "\n").with_context(|| format!("writing {}", p.display()))?;
            log::info!("Wrote {}", p.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{}", json)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dipola_core::DipoleGeometry;

    #[test]
    fn test_pack_unpack() {
        let params = DdaParams::new(DipoleGeometry::cuboid(2, 1, 1, 1.0), 1.0, 1, true).unwrap();
        let mut pol = vec![Complex::new(0.0, 0.0); params.vec_size()];
        params.set(
            &mut pol,
            1,
            [Complex::new(1.0, -1.0), Complex::new(2.0, 0.0), Complex::new(0.0, 3.0)],
        );
        let packed = pack_polarization(&params, &pol);
        assert_eq!(packed.len(), 2);
        assert_eq!(packed[1], [[1.0, -1.0], [2.0, 0.0], [0.0, 3.0]]);
        let back: Vec<C<f64>> = unpack_polarization(&params, &packed).unwrap();
        assert_eq!(back, pol);
        assert!(unpack_polarization::<f32>(&params, &packed[..1]).is_err());
    }

    #[test]
    fn test_warm_start_ignores_report_fields() {
        let record = SolutionRecord {
            incident: "x".to_string(),
            iterations: 3,
            start: "zero".to_string(),
            relative_error: 1e-6,
            elapsed_s: 0.5,
            history: vec![1e-2, 1e-6],
            polarization: vec![[[1.0, 0.0], [0.0, 0.0], [0.0, 0.0]]],
        };
        let report = RunReport {
            solver: SolverKind::QmrCs,
            backend: BackendKind::Cpu,
            precision: Precision::F64,
            shape: Shape::Box,
            nv_count: 1,
            lambda: 1.0,
            grid_unit: 0.1,
            refractive_index: [1.5, 0.0],
            epsilon: 1e-5,
            solutions: vec![record],
        };
        let path = std::env::temp_dir().join(format!("dipola-report-{}.json", std::process::id()));
        write_report(&report, Some(&path)).unwrap();
        let loaded = load_warm_start(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].incident, "x");
        assert_eq!(loaded[0].polarization, report.solutions[0].polarization);
    }
}
