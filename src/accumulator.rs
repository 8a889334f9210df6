use crate::linalg::SquareMatrix;
use crate::weiss::accumulate_translation_average;

/// Kind of Monte Carlo move, for the acceptance counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveKind {
    Single,
    Double,
    Global,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MoveStats {
    pub proposed: usize,
    pub accepted: usize,
}

impl MoveStats {
    pub fn rate(&self) -> f64 {
        if self.proposed == 0 {
            return 0.0;
        }
        self.accepted as f64 / self.proposed as f64
    }
}

/// Running sums of one sampling phase.
#[derive(Debug, Clone)]
pub struct MeasurementAccumulator {
    sites: usize,
    n_slices: usize,
    /// Sign weighted $\sum g_{ab}(\tau)$, one array per flavour.
    sums: Vec<Vec<f64>>,
    sign_sum: f64,
    pub n_measurements: usize,
    pub single: MoveStats,
    pub double: MoveStats,
    pub global: MoveStats,
    pub negative_ratios: usize,
    /// One observable value per measurement.
    pub series: Vec<f64>,
}

impl MeasurementAccumulator {
    pub fn new(n_flavours: usize, sites: usize, n_slices: usize) -> Self {
        MeasurementAccumulator {
            sites,
            n_slices,
            sums: vec![vec![0.0; sites * sites * n_slices]; n_flavours],
            sign_sum: 0.0,
            n_measurements: 0,
            single: MoveStats::default(),
            double: MoveStats::default(),
            global: MoveStats::default(),
            negative_ratios: 0,
            series: Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        for s in self.sums.iter_mut() {
            s.iter_mut().for_each(|x| *x = 0.0);
        }
        self.sign_sum = 0.0;
        self.n_measurements = 0;
        self.single = MoveStats::default();
        self.double = MoveStats::default();
        self.global = MoveStats::default();
        self.negative_ratios = 0;
        self.series.clear();
    }

    pub fn record_move(&mut self, kind: MoveKind, ratio: f64, accepted: bool) {
        let stats = match kind {
            MoveKind::Single => &mut self.single,
            MoveKind::Double => &mut self.double,
            MoveKind::Global => &mut self.global,
        };
        stats.proposed += 1;
        if accepted {
            stats.accepted += 1;
        }
        // Zero weight counts as a sign problem too.
        if ratio <= 0.0 {
            self.negative_ratios += 1;
        }
    }

    /// Adds the translation average of every flavour matrix. The observable is
    /// the flavour averaged $g_{00}(\beta/2)$.
    pub fn measure(&mut self, greens: &[&SquareMatrix], sign: f64) {
        let half = self.n_slices / 2;
        let mut observable = 0.0;
        for (sum, g) in self.sums.iter_mut().zip(greens.iter()) {
            let before = sum[half];
            accumulate_translation_average(g, self.sites, self.n_slices, sign, sum);
            observable += sign * (sum[half] - before);
        }
        self.series.push(observable / greens.len() as f64);
        self.sign_sum += sign;
        self.n_measurements += 1;
    }

    pub fn mean_sign(&self) -> f64 {
        if self.n_measurements == 0 {
            return 0.0;
        }
        self.sign_sum / self.n_measurements as f64
    }

    /// $\langle s\,g\rangle/\langle s\rangle$ per flavour.
    pub fn finalize(&self) -> Vec<Vec<f64>> {
        let norm = if self.sign_sum != 0.0 { 1.0 / self.sign_sum } else { 0.0 };
        self.sums
            .iter()
            .map(|s| s.iter().map(|x| x * norm).collect())
            .collect()
    }
}

/// Normalised autocorrelation $\gamma(\delta)$ for $\delta=0..$`max_lag`,
/// $\gamma(0)=1$.
pub fn autocorrelation_function(series: &[f64], max_lag: usize) -> Vec<f64> {
    let n = series.len();
    if n == 0 {
        return vec![1.0];
    }
    let max_lag = max_lag.min(n - 1);
    let mean = series.iter().sum::<f64>() / n as f64;
    let var = series.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / n as f64;
    (0..=max_lag)
        .map(|delta| {
            if var <= 0.0 {
                return if delta == 0 { 1.0 } else { 0.0 };
            }
            let count = (n - delta) as f64;
            let cov = series[..n - delta]
                .iter()
                .zip(series[delta..].iter())
                .map(|(a, b)| (a - mean) * (b - mean))
                .sum::<f64>()
                / count;
            cov / var
        })
        .collect()
}

/// Integrated autocorrelation time with Sokal's automatic window.
pub fn sokal_tau(gamma: &[f64]) -> f64 {
    let mut tau = 0.5;
    for (w, &g) in gamma.iter().enumerate().skip(1) {
        tau += g;
        if w as f64 >= 5.0 * tau {
            return tau;
        }
    }
    tau
}

#[cfg(test)]
mod test {
    use assert::close;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::weiss::build_retarded_weiss;

    #[test]
    fn white_noise_is_uncorrelated() {
        let mut rng = SmallRng::seed_from_u64(42);
        let sample: Vec<f64> = (0..2000).map(|_| rng.gen::<f64>()).collect();
        let gamma = autocorrelation_function(&sample, 500);
        close(gamma[0], 1.0, 1e-13);
        let max = gamma[1..500].iter().fold(<f64>::MIN, |a, b| a.max(*b));
        assert!(max < 0.15);
        assert!(sokal_tau(&gamma) < 1.5);

        let bits: Vec<f64> = sample.iter().map(|x| if *x > 0.5 { 1.0 } else { 0.0 }).collect();
        let gamma = autocorrelation_function(&bits, 100);
        close(gamma[0], 1.0, 1e-13);
        assert!(gamma[1..100].iter().all(|g| *g < 0.15));
    }

    #[test]
    fn correlated_chain_has_long_time() {
        let mut rng = SmallRng::seed_from_u64(42);
        let mut x = 0.0;
        let series: Vec<f64> = (0..20000)
            .map(|_| {
                x = 0.9 * x + rng.gen::<f64>() - 0.5;
                x
            })
            .collect();
        let tau = sokal_tau(&autocorrelation_function(&series, 200));
        // (1 + 0.9) / (2 (1 - 0.9))
        assert!(tau > 6.0 && tau < 13.0);
    }

    #[test]
    fn constant_series() {
        let gamma = autocorrelation_function(&[2.0; 10], 3);
        assert_eq!(gamma, vec![1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn sign_weighted_average() {
        let raw = vec![0.5, 0.3, 0.2, 0.1];
        let g = build_retarded_weiss(&raw);
        let mut acc = MeasurementAccumulator::new(2, 1, 4);
        acc.measure(&[&g, &g], 1.0);
        acc.measure(&[&g, &g], 1.0);
        acc.record_move(MoveKind::Single, -0.2, true);
        acc.record_move(MoveKind::Single, 0.7, false);
        acc.record_move(MoveKind::Global, 0.0, false);
        let out = acc.finalize();
        for (x, y) in out[1].iter().zip(raw.iter()) {
            close(*x, *y, 1e-15);
        }
        close(acc.mean_sign(), 1.0, 0.0);
        close(acc.series[1], 0.2, 1e-15);
        assert_eq!(acc.negative_ratios, 2);
        close(acc.global.rate(), 0.0, 0.0);
        close(acc.single.rate(), 0.5, 0.0);
        acc.reset();
        assert_eq!(acc.n_measurements, 0);
        assert!(acc.series.is_empty());
    }
}
