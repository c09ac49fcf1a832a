//! End-to-end solves with every Krylov method.
//!
//! Reference solutions come from a dense LU factorization (nalgebra).

use dipola_core::polarizability::clausius_mossotti;
use dipola_core::{CoupleConstants, DdaParams, DipoleGeometry};
use dipola_solver::{
    CpuBackend, DenseOperator, DeviceBackend, Error, FftMatVec, HostDevice, IterativeSolver,
    LinearOperator, ScaledIdentity, SolverConfig, SolverKind, StartChoice, VectorBackend,
};
use nalgebra::{DMatrix as NMatrix, DVector};
use num_complex::{Complex, Complex64};
use std::sync::Arc;

fn c(re: f64, im: f64) -> Complex64 {
    Complex::new(re, im)
}

fn cuboid(nx: u32, ny: u32, nz: u32, procs: usize) -> Arc<DdaParams> {
    Arc::new(DdaParams::new(DipoleGeometry::cuboid(nx, ny, nz, 0.05), 1.0, procs, true).unwrap())
}

/// Complex-symmetric matrix close to the identity.
fn symmetric_matrix(n: usize) -> DenseOperator<f64> {
    DenseOperator::from_fn(n, |r, col| {
        let (a, b) = (r.min(col), r.max(col));
        let u = ((a * 31 + b * 17 + a * b * 7) % 101) as f64 / 101.0 - 0.5;
        let v = ((a * 13 + b * 29 + 3) % 97) as f64 / 97.0 - 0.5;
        let off = c(u, v) * 0.04;
        if r == col { c(1.0, 0.0) + off } else { off }
    })
}

fn plane_wave(params: &DdaParams) -> Vec<Complex64> {
    let mut e = vec![c(0.0, 0.0); params.vec_size()];
    for (i, p) in params.geometry().positions().iter().enumerate() {
        let phase = Complex64::from_polar(1.0, params.kd() * p.z as f64);
        params.set(&mut e, i, [phase, phase * 0.5, c(0.0, 0.0)]);
    }
    e
}

fn rel_err(a: &[Complex64], b: &[Complex64]) -> f64 {
    let num: f64 = a.iter().zip(b).map(|(x, y)| (x - y).norm_sqr()).sum();
    let den: f64 = b.iter().map(|y| y.norm_sqr()).sum();
    (num / den).sqrt()
}

fn dense_solver(
    kind: SolverKind,
    op: DenseOperator<f64>,
    params: Arc<DdaParams>,
) -> IterativeSolver<f64, CpuBackend<f64>> {
    let backend = CpuBackend::new(Box::new(op));
    let mut solver = IterativeSolver::new(params, backend, SolverConfig::new(kind)).unwrap();
    solver
        .set_couple_constants(Arc::new(CoupleConstants::identity(1)))
        .unwrap();
    solver
}

fn cm_couple_constants(params: &DdaParams) -> Arc<CoupleConstants<f64>> {
    let alpha = clausius_mossotti(c(1.5, 0.01), params.kd());
    Arc::new(CoupleConstants::isotropic(&[alpha]))
}

#[test]
fn test_all_solvers_match_dense_lu() {
    // 16 dipoles: vec_stride 16, no padding
    let params = cuboid(2, 2, 4, 1);
    let n = params.vec_size();
    assert_eq!(n, 48);
    let op = symmetric_matrix(n);
    let rhs = plane_wave(&params);

    let a = NMatrix::from_fn(n, n, |r, col| op.entry(r, col));
    let x_ref = a.lu().solve(&DVector::from_column_slice(&rhs)).unwrap();
    let x_ref: Vec<Complex64> = x_ref.iter().copied().collect();

    for kind in SolverKind::ALL {
        let mut solver = dense_solver(kind, op.clone(), params.clone());
        let x = solver.get_pol_vec(&rhs, 1e-10, None, None).unwrap();
        let err = rel_err(&x, &x_ref);
        assert!(err < 1e-8, "{}: relative error {:e}", kind, err);
        let conv = solver.convergence();
        assert!(conv.converged());
        assert!(conv.iterations > 0 && conv.iterations < 48, "{}: {}", kind, conv.iterations);
    }
}

#[test]
fn test_fft_operator_matches_dense_lu() {
    let params = cuboid(2, 2, 2, 1);
    let cc = cm_couple_constants(&params);
    let stride = params.vec_stride();
    let idx: Vec<usize> = (0..3)
        .flat_map(|j| (0..params.nv_count()).map(move |i| i + j * stride))
        .collect();

    // reduced dense matrix of the symmetrized operator
    let mut op = FftMatVec::<f64>::new(params.clone());
    op.set_couple_constants(cc.clone()).unwrap();
    let m = idx.len();
    let mut a = NMatrix::<Complex64>::zeros(m, m);
    let mut unit = vec![c(0.0, 0.0); params.vec_size()];
    let mut col = vec![c(0.0, 0.0); params.vec_size()];
    for (k, &j) in idx.iter().enumerate() {
        unit.fill(c(0.0, 0.0));
        unit[j] = c(1.0, 0.0);
        op.apply(&unit, &mut col, false, None).unwrap();
        for (r, &i) in idx.iter().enumerate() {
            a[(r, k)] = col[i];
        }
    }

    let einc = plane_wave(&params);
    let s = cc.cc_sqrt(0)[0];
    let b = DVector::from_iterator(m, idx.iter().map(|&i| s * einc[i]));
    let y = a.lu().solve(&b).unwrap();

    for kind in SolverKind::ALL {
        let backend = CpuBackend::new(Box::new(FftMatVec::<f64>::new(params.clone())));
        let mut solver =
            IterativeSolver::new(params.clone(), backend, SolverConfig::new(kind)).unwrap();
        solver.set_couple_constants(cc.clone()).unwrap();
        let pol = solver.get_pol_vec(&einc, 1e-10, None, None).unwrap();
        let got: Vec<Complex64> = idx.iter().map(|&i| pol[i]).collect();
        let want: Vec<Complex64> = y.iter().map(|v| s * v).collect();
        let err = rel_err(&got, &want);
        assert!(err < 1e-8, "{}: relative error {:e}", kind, err);
    }
}

#[test]
fn test_repeated_solves_are_bit_identical() {
    let params = cuboid(3, 2, 2, 1);
    let cc = cm_couple_constants(&params);
    let einc = plane_wave(&params);
    for kind in SolverKind::ALL {
        let run = || {
            let backend = CpuBackend::new(Box::new(FftMatVec::<f64>::new(params.clone())));
            let mut solver =
                IterativeSolver::new(params.clone(), backend, SolverConfig::new(kind)).unwrap();
            solver.set_couple_constants(cc.clone()).unwrap();
            let first = solver.get_pol_vec(&einc, 1e-9, None, None).unwrap();
            let second = solver.get_pol_vec(&einc, 1e-9, None, None).unwrap();
            assert_eq!(first, second, "{}: reused solver differs", kind);
            first
        };
        assert_eq!(run(), run(), "{}: fresh solvers differ", kind);
    }
}

#[test]
fn test_identity_operator_rhs_start_is_exact() {
    let params = cuboid(2, 2, 4, 1);
    let einc = plane_wave(&params);
    for kind in SolverKind::ALL {
        let op = ScaledIdentity::new(params.vec_size(), c(1.0, 0.0));
        let backend = CpuBackend::new(Box::new(op));
        let mut solver =
            IterativeSolver::new(params.clone(), backend, SolverConfig::new(kind)).unwrap();
        solver
            .set_couple_constants(Arc::new(CoupleConstants::identity(1)))
            .unwrap();
        let x = solver.get_pol_vec(&einc, 1e-12, None, None).unwrap();
        let conv = solver.convergence();
        assert_eq!(conv.start_choice, StartChoice::Rhs, "{}", kind);
        assert_eq!(conv.iterations, 0, "{}", kind);
        assert_eq!(x, einc, "{}", kind);
    }
}

#[test]
fn test_diagonal_operator_converges() {
    let params = cuboid(2, 2, 4, 1);
    let n = params.vec_size();
    let diag: Vec<Complex64> = (0..n)
        .map(|i| c(2.8 + 0.4 * i as f64 / n as f64, 0.05))
        .collect();
    let op = DenseOperator::from_fn(n, |r, col| if r == col { diag[r] } else { c(0.0, 0.0) });
    let einc = plane_wave(&params);
    let x_ref: Vec<Complex64> = einc.iter().zip(&diag).map(|(b, d)| b / d).collect();

    for kind in SolverKind::ALL {
        let mut solver = dense_solver(kind, op.clone(), params.clone());
        let x = solver.get_pol_vec(&einc, 1e-10, None, None).unwrap();
        let conv = solver.convergence();
        // |1 - d| > 1 everywhere, so b - A b is larger than b
        assert_eq!(conv.start_choice, StartChoice::Zero, "{}", kind);
        assert!(
            conv.iterations >= 1 && conv.iterations < 30,
            "{}: {} iterations",
            kind,
            conv.iterations
        );
        assert!(conv.converged(), "{}", kind);
        let err = rel_err(&x, &x_ref);
        assert!(err < 1e-8, "{}: relative error {:e}", kind, err);
    }
}

#[test]
fn test_cheapest_start_selection() {
    let params = cuboid(1, 1, 1, 1);
    let n = params.vec_size();
    let mut einc = vec![c(0.0, 0.0); n];
    params.set(&mut einc, 0, [c(4.0, 0.0), c(0.0, 0.0), c(0.0, 0.0)]);

    let solve = |start_x: f64| {
        let backend = CpuBackend::new(Box::new(ScaledIdentity::new(n, c(2.0, 0.0))));
        let mut solver =
            IterativeSolver::new(params.clone(), backend, SolverConfig::new(SolverKind::Cgnr))
                .unwrap();
        solver
            .set_couple_constants(Arc::new(CoupleConstants::identity(1)))
            .unwrap();
        let mut start = vec![c(0.0, 0.0); n];
        params.set(&mut start, 0, [c(start_x, 0.0), c(0.0, 0.0), c(0.0, 0.0)]);
        let x = solver.get_pol_vec(&einc, 1e-8, Some(&start), None).unwrap();
        (x, solver.convergence().start_choice, solver.convergence().iterations)
    };

    // warm start worse than zero; the RHS start ties with zero and is kept
    let (x, choice, iterations) = solve(100.0);
    assert_eq!(choice, StartChoice::Rhs);
    assert!(iterations >= 1);
    assert!((params.get(&x, 0)[0] - c(2.0, 0.0)).norm() < 1e-12);

    // exact warm start: no iterations needed
    let (x, choice, iterations) = solve(2.0);
    assert_eq!(choice, StartChoice::WarmStart);
    assert_eq!(iterations, 0);
    assert_eq!(params.get(&x, 0)[0], c(2.0, 0.0));
}

#[test]
fn test_rhs_start_when_cheaper() {
    let params = cuboid(2, 2, 4, 1);
    let einc = plane_wave(&params);
    let mut solver = dense_solver(SolverKind::QmrCs, symmetric_matrix(params.vec_size()), params.clone());
    solver.get_pol_vec(&einc, 1e-8, None, None).unwrap();
    // A is close to I, so b - A b is much smaller than b
    assert_eq!(solver.convergence().start_choice, StartChoice::Rhs);
}

#[test]
fn test_best_residual_is_monotone() {
    let params = cuboid(2, 2, 4, 1);
    let einc = plane_wave(&params);
    for kind in SolverKind::ALL {
        let mut solver = dense_solver(kind, symmetric_matrix(params.vec_size()), params.clone());
        solver.get_pol_vec(&einc, 1e-10, None, None).unwrap();
        let conv = solver.convergence();

        let mut best = conv.inprod_r_init;
        let mut counter = 0;
        for &res in &conv.history {
            if res <= best {
                best = res;
                counter = 0;
            } else {
                counter += 1;
            }
            assert!(best <= conv.inprod_r_init);
        }
        assert_eq!(best, conv.inprod_r, "{}", kind);
        assert_eq!(counter, conv.counter, "{}", kind);
        assert_eq!(conv.history.len(), conv.iterations);
    }
}

fn zero_operator_solver(
    params: &Arc<DdaParams>,
    kind: SolverKind,
) -> IterativeSolver<f64, CpuBackend<f64>> {
    let backend = CpuBackend::new(Box::new(ScaledIdentity::new(params.vec_size(), c(0.0, 0.0))));
    let mut solver =
        IterativeSolver::new(params.clone(), backend, SolverConfig::new(kind)).unwrap();
    solver
        .set_couple_constants(Arc::new(CoupleConstants::identity(1)))
        .unwrap();
    solver
}

#[test]
fn test_zero_operator_breaks_down() {
    let params = cuboid(2, 2, 4, 1);
    let einc = plane_wave(&params);
    for kind in [SolverKind::BicgCs, SolverKind::BicgStab, SolverKind::QmrCs] {
        let mut solver = zero_operator_solver(&params, kind);

        match solver.get_pol_vec(&einc, 1e-8, None, None) {
            Err(Error::Breakdown { solver: s, .. }) => assert_eq!(s, kind),
            other => panic!("{}: expected breakdown, got {:?}", kind, other.map(|v| v.len())),
        }

        // guards are off in profiling runs
        let mut out = Vec::new();
        let report = solver.profiling_run(&mut out, None).unwrap();
        assert_eq!(report.samples.len(), 5);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains(" +- "));
    }
}

#[test]
fn test_zero_operator_cgnr_stops_without_improvement() {
    let params = cuboid(2, 2, 4, 1);
    let einc = plane_wave(&params);
    let mut solver = zero_operator_solver(&params, SolverKind::Cgnr);
    match solver.get_pol_vec(&einc, 1e-8, None, None) {
        Err(Error::NoImprovement { limit }) => assert_eq!(limit, 10),
        other => panic!("expected no improvement, got {:?}", other.map(|v| v.len())),
    }
    assert_eq!(solver.convergence().iterations, 11);
}

#[test]
fn test_qmr_accepts_tiny_residual_from_warm_start() {
    let params = cuboid(2, 2, 4, 1);
    let n = params.vec_size();
    let op = symmetric_matrix(n);
    let rhs = plane_wave(&params);
    let a = NMatrix::from_fn(n, n, |r, col| op.entry(r, col));
    let x_ref: Vec<Complex64> = a
        .lu()
        .solve(&DVector::from_column_slice(&rhs))
        .unwrap()
        .iter()
        .copied()
        .collect();

    // |r|^2 / |b|^2 is about 1e-14, below the lower beta bound of later steps
    let start: Vec<Complex64> = x_ref.iter().map(|v| v * (1.0 + 1e-7)).collect();
    let mut solver = dense_solver(SolverKind::QmrCs, op, params.clone());
    let x = solver.get_pol_vec(&rhs, 1e-11, Some(&start), None).unwrap();
    let conv = solver.convergence();
    assert_eq!(conv.start_choice, StartChoice::WarmStart);
    assert!(conv.inprod_r_init * conv.resid_scale < 1e-10);
    assert!(conv.iterations >= 1);
    assert!(rel_err(&x, &x_ref) < 1e-9);
}

#[test]
fn test_profiling_run_on_fresh_solver() {
    let params = cuboid(2, 2, 2, 1);
    let cc = cm_couple_constants(&params);
    for kind in SolverKind::ALL {
        let backend = CpuBackend::new(Box::new(FftMatVec::<f64>::new(params.clone())));
        let mut solver =
            IterativeSolver::new(params.clone(), backend, SolverConfig::new(kind)).unwrap();
        solver.set_couple_constants(cc.clone()).unwrap();

        let mut out = Vec::new();
        let report = solver.profiling_run(&mut out, None).unwrap();
        assert_eq!(report.samples.len(), 5, "{}", kind);
        assert!(report.samples.windows(2).all(|w| w[0].1 <= w[1].1));
        assert_eq!(solver.convergence().iterations, 0);
    }
}

#[test]
fn test_iteration_limit() {
    let params = cuboid(2, 2, 4, 1);
    let einc = plane_wave(&params);
    let backend = CpuBackend::new(Box::new(symmetric_matrix(params.vec_size())));
    let config = SolverConfig::new(SolverKind::BicgStab).with_max_iter(2);
    let mut solver = IterativeSolver::new(params.clone(), backend, config).unwrap();
    solver
        .set_couple_constants(Arc::new(CoupleConstants::identity(1)))
        .unwrap();
    match solver.get_pol_vec(&einc, 1e-14, None, None) {
        Err(Error::TooManyIterations { limit }) => assert_eq!(limit, 2),
        other => panic!("expected iteration limit, got {:?}", other.map(|v| v.len())),
    }
    assert_eq!(solver.convergence().iterations, 2);
}

#[test]
fn test_missing_couple_constants() {
    let params = cuboid(1, 1, 2, 1);
    let backend = CpuBackend::new(Box::new(FftMatVec::<f64>::new(params.clone())));
    let mut solver = IterativeSolver::new(params.clone(), backend, SolverConfig::default()).unwrap();
    let einc = plane_wave(&params);
    assert!(matches!(
        solver.get_pol_vec(&einc, 1e-6, None, None),
        Err(Error::MissingCoupleConstants)
    ));
    let mut out = Vec::new();
    assert!(solver.profiling_run(&mut out, None).is_err());
}

#[test]
fn test_zero_field_gives_zero_polarization() {
    let params = cuboid(2, 1, 1, 1);
    let mut solver = dense_solver(SolverKind::Cgnr, symmetric_matrix(params.vec_size()), params.clone());
    let x = solver
        .get_pol_vec(&vec![c(0.0, 0.0); params.vec_size()], 1e-6, None, None)
        .unwrap();
    assert!(x.iter().all(|v| *v == c(0.0, 0.0)));
    assert_eq!(solver.convergence().iterations, 0);
}

#[test]
fn test_device_backend_matches_cpu() {
    let params = cuboid(2, 2, 3, 3);
    let cc = cm_couple_constants(&params);
    let einc = plane_wave(&params);
    for kind in SolverKind::ALL {
        let cpu = CpuBackend::new(Box::new(FftMatVec::<f64>::new(params.clone())));
        let mut cpu_solver =
            IterativeSolver::new(params.clone(), cpu, SolverConfig::new(kind)).unwrap();
        cpu_solver.set_couple_constants(cc.clone()).unwrap();
        let want = cpu_solver.get_pol_vec(&einc, 1e-10, None, None).unwrap();

        let dev = DeviceBackend::new(
            params.clone(),
            HostDevice::boxed_set(3),
            Box::new(FftMatVec::<f64>::new(params.clone())),
        )
        .unwrap();
        assert_eq!(dev.device_count(), 3);
        let mut dev_solver =
            IterativeSolver::new(params.clone(), dev, SolverConfig::new(kind)).unwrap();
        dev_solver.set_couple_constants(cc.clone()).unwrap();
        let got = dev_solver.get_pol_vec(&einc, 1e-10, None, None).unwrap();

        assert_eq!(dev_solver.backend().vec_size(), params.vec_size());
        let err = rel_err(&got, &want);
        assert!(err < 1e-8, "{}: relative error {:e}", kind, err);
    }
}

#[test]
fn test_single_precision_tracks_double() {
    let params = cuboid(2, 2, 2, 1);
    let cc = cm_couple_constants(&params);
    let einc = plane_wave(&params);

    let backend = CpuBackend::new(Box::new(FftMatVec::<f64>::new(params.clone())));
    let mut solver = IterativeSolver::new(params.clone(), backend, SolverConfig::default()).unwrap();
    solver.set_couple_constants(cc.clone()).unwrap();
    let want = solver.get_pol_vec(&einc, 1e-10, None, None).unwrap();

    let backend = CpuBackend::new(Box::new(FftMatVec::<f32>::new(params.clone())));
    let mut solver = IterativeSolver::new(params.clone(), backend, SolverConfig::default()).unwrap();
    solver.set_couple_constants(Arc::new(cc.cast::<f32>())).unwrap();
    let einc32: Vec<Complex<f32>> = einc
        .iter()
        .map(|v| Complex::new(v.re as f32, v.im as f32))
        .collect();
    let got: Vec<Complex64> = solver
        .get_pol_vec(&einc32, 1e-5, None, None)
        .unwrap()
        .iter()
        .map(|v| Complex::new(v.re as f64, v.im as f64))
        .collect();
    assert!(rel_err(&got, &want) < 1e-3);
}
