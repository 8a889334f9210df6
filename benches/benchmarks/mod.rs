pub mod fast_update;
pub mod monte_carlo;
pub mod transforms;

use hfdmft::linalg::SquareMatrix;
use hfdmft::weiss::build_retarded_weiss;

/// Smooth, antiperiodic looking kernel of size `n`.
pub fn toy_weiss(n: usize) -> SquareMatrix {
    let raw: Vec<f64> = (0..n)
        .map(|l| 0.5 * <f64>::cosh(0.2 * (l as f64 - n as f64 / 2.0)) / <f64>::cosh(0.1 * n as f64))
        .collect();
    build_retarded_weiss(&raw)
}
