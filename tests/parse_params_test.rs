use std::path::Path;

use hfdmft::params::{AcceptanceRule, LatticeKind, SolverKind, Updater};
use hfdmft::parse::params::parse_params_def;
use hfdmft::DmftError;

#[test]
fn test_parse_bethe() {
    let fp = Path::new("tests/params_def/bethe_hf.csv");
    let params = parse_params_def(fp).unwrap();
    assert_eq!(params.model.beta, 16.0);
    assert_eq!(params.solver.n_tau, 32);
    assert_eq!(params.model.lattice, LatticeKind::Bethe);
    assert_eq!(params.solver.kind, SolverKind::HirschFye);
    assert_eq!(params.solver.seed, 4213);
    assert_eq!(params.dmft.convergence_tol, 4e-3);
    assert!(params.solver.save_logs);
    assert_eq!(params.dtau(), 0.5);
}

#[test]
fn test_parse_dimer() {
    let fp = Path::new("tests/params_def/dimer_ipt.csv");
    let params = parse_params_def(fp).unwrap();
    assert_eq!(params.model.sites, 2);
    assert_eq!(params.model.lattice, LatticeKind::Dimer);
    assert_eq!(params.solver.kind, SolverKind::Ipt);
    assert_eq!(params.solver.n_tau, 2048);
    assert_eq!(params.model.tab, 0.1);
    assert_eq!(params.dmft.mixing, 0.5);
    assert_eq!(params.solver.updater, Updater::Continuous);
    assert_eq!(params.solver.acceptance, AcceptanceRule::HeatBath);
    assert_eq!(params.solver.max_time, Some(120.0));
    // Untouched keys keep their default.
    assert_eq!(params.solver.sweeps, 3000);
}

#[test]
fn test_unknown_key() {
    let fp = Path::new("tests/params_def/unknown_key.csv");
    match parse_params_def(fp) {
        Err(DmftError::Configuration { details }) => assert!(details.contains("TEMPERATURE")),
        other => panic!("Should have errored, got {:?}.", other),
    }
}

#[test]
fn test_float_parse_error() {
    let fp = Path::new("tests/params_def/float_parse_error.csv");
    assert!(matches!(parse_params_def(fp), Err(DmftError::Configuration { .. })));
}

#[test]
fn test_invalid_combination() {
    let fp = Path::new("tests/params_def/invalid_combination.csv");
    assert!(matches!(parse_params_def(fp), Err(DmftError::Configuration { .. })));
}

#[test]
fn test_repeated_key() {
    let fp = Path::new("tests/params_def/repeated_key.csv");
    assert!(parse_params_def(fp).is_err());
}

#[test]
fn test_three_columns() {
    let fp = Path::new("tests/params_def/three_columns.csv");
    assert!(parse_params_def(fp).is_err());
}

#[test]
fn test_missing_file() {
    assert!(parse_params_def("tests/params_def/does_not_exist.csv").is_err());
}
