//! WebGPU device tests. Each test returns early when no adapter is present.

use dipola_backend_wgpu::{WgpuContext, WgpuDevice};
use dipola_core::polarizability::clausius_mossotti;
use dipola_core::{CoupleConstants, DdaParams, DipoleGeometry};
use dipola_solver::device::DeviceReduction;
use dipola_solver::{
    C, Coeff, ComputeDevice, CpuBackend, DeviceBackend, FftMatVec, IterativeSolver, ScalarExpr,
    ScalarSlot, SolverConfig, SolverKind,
};
use num_complex::Complex;
use std::sync::Arc;

fn try_device() -> Option<WgpuDevice> {
    match WgpuContext::new() {
        Ok(ctx) => Some(WgpuDevice::new(Arc::new(ctx), "wgpu-test")),
        Err(_) => {
            eprintln!("Skipping test: no GPU available");
            None
        }
    }
}

fn c(re: f32, im: f32) -> C<f32> {
    Complex::new(re, im)
}

fn close(a: C<f32>, b: C<f32>, tol: f32) -> bool {
    (a - b).norm() <= tol * (1.0 + b.norm())
}

#[test]
fn test_write_read_round_trip_with_offset() {
    let Some(mut d) = try_device() else { return };
    let b = d.alloc(10, "b").unwrap();
    d.write(b, 3, &[c(1.0, 2.0), c(3.0, -4.0)]).unwrap();
    let mut out = [c(9.0, 9.0); 4];
    d.read(b, 2, &mut out).unwrap();
    assert_eq!(out, [c(0.0, 0.0), c(1.0, 2.0), c(3.0, -4.0), c(0.0, 0.0)]);
    assert!(d.write(b, 9, &[c(0.0, 0.0); 2]).is_err());
}

#[test]
fn test_lin_comb_with_output_among_terms() {
    let Some(mut d) = try_device() else { return };
    let n = 1000;
    let x = d.alloc(n, "x").unwrap();
    let y = d.alloc(n, "y").unwrap();
    let xs: Vec<C<f32>> = (0..n).map(|i| c(i as f32, 1.0)).collect();
    let ys: Vec<C<f32>> = (0..n).map(|i| c(0.5, -(i as f32))).collect();
    d.write(x, 0, &xs).unwrap();
    d.write(y, 0, &ys).unwrap();

    let s = ScalarSlot::new(3);
    d.write_scalar(s, c(0.0, 2.0)).unwrap();
    // y = 2 y + (2i) x
    d.lin_comb(y, &[(y, Coeff::Value(c(2.0, 0.0))), (x, Coeff::Slot(s))])
        .unwrap();

    let mut out = vec![c(0.0, 0.0); n];
    d.read(y, 0, &mut out).unwrap();
    for i in 0..n {
        let expected = ys[i] * 2.0 + c(0.0, 2.0) * xs[i];
        assert!(close(out[i], expected, 1e-6), "{}: {} vs {}", i, out[i], expected);
    }
}

#[test]
fn test_reductions_match_host() {
    let Some(mut d) = try_device() else { return };
    let n = 5000;
    let a = d.alloc(n, "a").unwrap();
    let b = d.alloc(n, "b").unwrap();
    let av: Vec<C<f32>> = (0..n).map(|i| c((i % 7) as f32 * 0.1, 0.2)).collect();
    let bv: Vec<C<f32>> = (0..n).map(|i| c(0.3, (i % 5) as f32 * -0.1)).collect();
    d.write(a, 0, &av).unwrap();
    d.write(b, 0, &bv).unwrap();

    let norm: f32 = av.iter().map(|v| v.norm_sqr()).sum();
    let dot: C<f32> = av.iter().zip(&bv).map(|(x, y)| x * y.conj()).sum();
    let dot_unconj: C<f32> = av.iter().zip(&bv).map(|(x, y)| x * y).sum();

    let s = ScalarSlot::new(1);
    d.reduce(DeviceReduction::Norm(a), s).unwrap();
    assert!(close(d.read_scalar(s).unwrap(), c(norm, 0.0), 1e-4));
    d.reduce(DeviceReduction::Dot(a, b), s).unwrap();
    assert!(close(d.read_scalar(s).unwrap(), dot, 1e-4));
    d.reduce(DeviceReduction::DotUnconj(a, b), s).unwrap();
    assert!(close(d.read_scalar(s).unwrap(), dot_unconj, 1e-4));
}

#[test]
fn test_scalar_expressions_stay_on_device() {
    let Some(mut d) = try_device() else { return };
    let a = ScalarSlot::new(1);
    let b = ScalarSlot::new(2);
    let r = ScalarSlot::new(3);
    d.write_scalar(a, c(1.0, 2.0)).unwrap();
    d.write_scalar(b, c(0.0, 1.0)).unwrap();

    d.eval(r, ScalarExpr::Div(a, b)).unwrap();
    assert!(close(d.read_scalar(r).unwrap(), c(2.0, -1.0), 1e-6));
    d.eval(r, ScalarExpr::NegMul(a, b)).unwrap();
    assert!(close(d.read_scalar(r).unwrap(), c(2.0, -1.0), 1e-6));
    d.eval(r, ScalarExpr::Value(c(0.5, 0.5))).unwrap();
    assert_eq!(d.read_scalar(r).unwrap(), c(0.5, 0.5));
    assert!(d.eval(ScalarSlot::new(10_000), ScalarExpr::Copy(a)).is_err());
}

#[test]
fn test_solve_matches_cpu_backend() {
    let Some(device) = try_device() else { return };
    let params = Arc::new(
        DdaParams::new(DipoleGeometry::cuboid(3, 3, 3, 0.05), 1.0, 1, true).unwrap(),
    );
    let alpha = clausius_mossotti(Complex::new(1.5, 0.01), params.kd());
    let cc = Arc::new(CoupleConstants::isotropic(&[alpha]).cast::<f32>());
    let mut einc = vec![c(0.0, 0.0); params.vec_size()];
    for i in 0..params.nv_count() {
        params.set(&mut einc, i, [c(1.0, 0.0), c(0.0, 0.0), c(0.0, 0.0)]);
    }

    let cpu = CpuBackend::new(Box::new(FftMatVec::<f32>::new(params.clone())));
    let mut reference =
        IterativeSolver::new(params.clone(), cpu, SolverConfig::new(SolverKind::QmrCs)).unwrap();
    reference.set_couple_constants(cc.clone()).unwrap();
    let expected = reference.get_pol_vec(&einc, 1e-4, None, None).unwrap();

    let backend = DeviceBackend::new(
        params.clone(),
        vec![Box::new(device) as Box<dyn ComputeDevice<f32>>],
        Box::new(FftMatVec::<f32>::new(params.clone())),
    )
    .unwrap();
    let mut solver =
        IterativeSolver::new(params.clone(), backend, SolverConfig::new(SolverKind::QmrCs))
            .unwrap();
    solver.set_couple_constants(cc).unwrap();
    let got = solver.get_pol_vec(&einc, 1e-4, None, None).unwrap();

    let num: f32 = got.iter().zip(&expected).map(|(a, b)| (a - b).norm_sqr()).sum();
    let den: f32 = expected.iter().map(|b| b.norm_sqr()).sum();
    assert!((num / den).sqrt() < 1e-2);
}
