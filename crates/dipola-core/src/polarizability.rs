//! Polarizability models producing coupling constants.

use num_complex::Complex64;
use std::f64::consts::PI;

/// Clausius-Mossotti polarizability with radiative reaction correction.
///
/// `m` is the complex refractive index relative to the host medium and
/// `kd` the wavenumber in grid units. The result is in units of the grid
/// cell volume.
pub fn clausius_mossotti(m: Complex64, kd: f64) -> Complex64 {
    let m2 = m * m;
    let alpha_cm = 3.0 / (4.0 * PI) * (m2 - 1.0) / (m2 + 2.0);
    let rr = Complex64::new(0.0, 2.0 / 3.0 * kd * kd * kd);
    alpha_cm / (1.0 - rr * alpha_cm)
}
