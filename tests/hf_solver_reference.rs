use assert::close;
use num::complex::Complex64;

use hfdmft::comm::{Communicator, LocalGroup};
use hfdmft::green::GreenTau;
use hfdmft::matsubara::{gw_invfouriertrans, matsubara_frequencies, semicircle, Tail};
use hfdmft::params::SolverParams;
use hfdmft::solver::{HirschFyeSolver, ImpuritySolver, SolverDiagnostics};

const BETA: f64 = 16.0;
const N_MATSUBARA: usize = 16;
const L: usize = 32;
const U: f64 = 2.0;
const MU: f64 = 0.0;
const TOLERANCE: f64 = 6e-3;
const SWEEPS: usize = 3000;
const THERM: usize = 1000;
const SEED: u64 = 4213;
const CHAINS: usize = 4;

/// Half filled Bethe lattice, $\beta=16$, $U=2$, $L=32$.
const REFERENCE: [f64; L] = [
    -0.5, -0.335, -0.246, -0.196, -0.164, -0.144, -0.129, -0.118, -0.11, -0.104, -0.099, -0.095, -0.092,
    -0.09, -0.089, -0.087, -0.087, -0.087, -0.089, -0.09, -0.092, -0.095, -0.099, -0.104, -0.11, -0.118,
    -0.129, -0.144, -0.164, -0.196, -0.246, -0.335,
];

fn bethe_weiss_tau() -> Vec<f64> {
    let wn = matsubara_frequencies(BETA, 64 * N_MATSUBARA);
    let giw = semicircle(&wn, 0.0, 1.0);
    let g0iw: Vec<Complex64> = giw
        .iter()
        .zip(wn.iter())
        .map(|(g, &w)| 1.0 / (Complex64::new(MU, w) - 0.25 * g))
        .collect();
    let taus: Vec<f64> = (0..L).map(|l| l as f64 * BETA / L as f64).collect();
    gw_invfouriertrans(&g0iw, &taus, &wn, &Tail::new(1.0, -MU, 0.0), BETA)
}

fn reference_params() -> SolverParams {
    SolverParams { n_tau: L, sweeps: SWEEPS, therm: THERM, seed: SEED, ..Default::default() }
}

/// Independent chains seeded `SEED + rank`, averaged over a local group the
/// way the self-consistency loop does.
fn solve_chains(weiss: &GreenTau, params: &SolverParams) -> (GreenTau, Vec<SolverDiagnostics>) {
    let results: Vec<(GreenTau, SolverDiagnostics)> = std::thread::scope(|s| {
        let handles: Vec<_> = LocalGroup::new(CHAINS)
            .into_iter()
            .map(|comm| {
                s.spawn(move || {
                    let mut solver = HirschFyeSolver::for_rank(U, params, comm.rank());
                    let (mut g, diagnostics) = solver.solve(weiss).unwrap();
                    comm.all_reduce_mean(&mut g.data);
                    (g, diagnostics)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    let g = results[0].0.clone();
    for (other, _) in results.iter() {
        assert_eq!(other.data, g.data);
    }
    (g, results.into_iter().map(|(_, d)| d).collect())
}

#[test]
fn single_band_reference() {
    let weiss = GreenTau::scalar(BETA, bethe_weiss_tau());
    let (g, chains) = solve_chains(&weiss, &reference_params());
    close(g.data[0], -0.5, 1e-3);
    for (l, (value, expected)) in g.data.iter().zip(REFERENCE.iter()).enumerate() {
        assert!(
            (value - expected).abs() < TOLERANCE,
            "G(tau_{}) = {} differs from {}",
            l,
            value,
            expected
        );
    }
    for diagnostics in chains {
        assert_eq!(diagnostics.n_sweeps, SWEEPS);
        assert!(diagnostics.mean_sign > 0.99);
        assert!(diagnostics.acceptance_rate > 0.0 && diagnostics.acceptance_rate < 1.0);
        assert_eq!(diagnostics.drift_warnings, 0);
    }
}

#[test]
fn dimer_of_decoupled_sites_reference() {
    let g0t = bethe_weiss_tau();
    let mut data = Vec::with_capacity(4 * L);
    data.extend_from_slice(&g0t);
    data.extend(std::iter::repeat(0.0).take(2 * L));
    data.extend_from_slice(&g0t);
    let weiss = GreenTau::from_data(BETA, 2, L, data).unwrap();
    let (g, _) = solve_chains(&weiss, &reference_params());
    for a in 0..2 {
        for (value, expected) in g.block(a, a).iter().zip(REFERENCE.iter()) {
            assert!((value - expected).abs() < TOLERANCE, "{} != {}", value, expected);
        }
        for value in g.block(a, 1 - a) {
            assert!(value.abs() < TOLERANCE, "off diagonal {}", value);
        }
    }
}

#[test]
fn same_seed_same_answer() {
    let weiss = GreenTau::scalar(BETA, bethe_weiss_tau());
    let params = SolverParams { n_tau: L, sweeps: 200, therm: 50, ..Default::default() };
    let (a, da) = HirschFyeSolver::new(U, &params).solve(&weiss).unwrap();
    let (b, db) = HirschFyeSolver::new(U, &params).solve(&weiss).unwrap();
    assert_eq!(a.data, b.data);
    assert_eq!(da.acceptance_rate, db.acceptance_rate);
    let (c, _) = HirschFyeSolver::for_rank(U, &params, 1).solve(&weiss).unwrap();
    assert_ne!(a.data, c.data);
}
