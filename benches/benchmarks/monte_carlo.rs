use criterion::{criterion_group, Criterion};
use hfdmft::ising::IsingField;
use hfdmft::monte_carlo::MetropolisSampler;
use hfdmft::params::SolverParams;
use rand::rngs::SmallRng;
use rand::SeedableRng;

use super::toy_weiss;

pub fn sweeps(c: &mut Criterion) {
    for n in [32, 64] {
        let params = SolverParams { n_tau: n, ..Default::default() };
        let g0 = toy_weiss(n);
        let field = match IsingField::seeded(n, 1, 16.0 / n as f64, 2.0, 4213, 0.5) {
            Ok(f) => f,
            Err(e) => panic!("{}", e),
        };
        let mut sampler = match MetropolisSampler::new(SmallRng::seed_from_u64(42), field, vec![g0.clone(), g0], &params) {
            Ok(s) => s,
            Err(e) => panic!("{}", e),
        };
        c.bench_function(&format!("Hirsch-Fye sweep L = {}", n), |b| {
            b.iter(|| sampler.sweep())
        });
    }
}

criterion_group!(benches, sweeps);
