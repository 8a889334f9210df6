use log::{debug, info, trace, warn};
use rand::Rng;
use std::time::{Duration, Instant};

use crate::accumulator::{autocorrelation_function, sokal_tau, MeasurementAccumulator, MoveKind};
use crate::errors::Result;
use crate::fast_update::{FastUpdateEngine, FLAVOUR_SIGNS};
use crate::ising::{IsingField, Proposal};
use crate::linalg::SquareMatrix;
use crate::params::{AcceptanceRule, SolverParams, Updater};
use crate::solver::SolverDiagnostics;

/// Sweep counts and wall clock limit of one sampling run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingBudget {
    pub sweeps: usize,
    pub therm: usize,
    pub n_meas: usize,
    pub max_time: Option<Duration>,
}

impl SamplingBudget {
    pub fn from_params(params: &SolverParams) -> Self {
        SamplingBudget {
            sweeps: params.sweeps,
            therm: params.therm,
            n_meas: params.n_meas,
            max_time: params.time_budget(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerPhase {
    Thermalizing,
    Sampling,
    Finished,
}

/// Averaged $g_\sigma(\tau)$ per flavour, in the $g=-G$ convention, with the
/// statistics of the run.
#[derive(Debug, Clone)]
pub struct SamplerOutput {
    pub g: Vec<Vec<f64>>,
    pub diagnostics: SolverDiagnostics,
}

/// Markov chain over the Ising field.
pub struct MetropolisSampler<R: Rng> {
    rng: R,
    field: IsingField,
    engine: FastUpdateEngine,
    acc: MeasurementAccumulator,
    phase: SamplerPhase,
    updater: Updater,
    acceptance: AcceptanceRule,
    global_flip: usize,
    double_flip: usize,
    sign: f64,
    n_sweeps: usize,
}

impl<R: Rng> MetropolisSampler<R> {
    /// `weiss` holds one kernel per flavour, `field` must be seeded.
    pub fn new(rng: R, field: IsingField, weiss: Vec<SquareMatrix>, params: &SolverParams) -> Result<Self> {
        let engine = FastUpdateEngine::new(weiss, &field, params.tolerances())?;
        let acc = MeasurementAccumulator::new(FLAVOUR_SIGNS.len(), field.n_sites(), field.n_slices());
        Ok(MetropolisSampler {
            rng,
            field,
            engine,
            acc,
            phase: SamplerPhase::Thermalizing,
            updater: params.updater,
            acceptance: params.acceptance,
            global_flip: params.global_flip,
            double_flip: params.double_flip,
            sign: 1.0,
            n_sweeps: 0,
        })
    }

    pub fn phase(&self) -> SamplerPhase {
        self.phase
    }

    pub fn field(&self) -> &IsingField {
        &self.field
    }

    pub fn engine(&self) -> &FastUpdateEngine {
        &self.engine
    }

    pub fn accumulator(&self) -> &MeasurementAccumulator {
        &self.acc
    }

    #[inline(always)]
    fn decide(&mut self, ratio: f64) -> bool {
        let r = <f64>::abs(ratio);
        match self.acceptance {
            AcceptanceRule::Metropolis => r >= 1.0 || self.rng.gen::<f64>() < r,
            AcceptanceRule::HeatBath => self.rng.gen::<f64>() < r / (1.0 + r),
        }
    }

    fn try_move(&mut self, kind: MoveKind, proposal: Proposal) -> Result<bool> {
        let ratio = match self.engine.ratio(&proposal, &self.field) {
            Ok(ratio) => ratio,
            Err(e) => {
                self.field.reject()?;
                return Err(e);
            }
        };
        trace!("Proposed {:?}, ratio: {}", proposal, ratio);
        let accepted = self.decide(ratio);
        if accepted {
            trace!("Accept.");
            self.field.accept()?;
            self.engine.apply(&proposal, &self.field)?;
            if ratio < 0.0 {
                self.sign = -self.sign;
            }
        } else {
            self.field.reject()?;
        }
        if self.phase == SamplerPhase::Sampling {
            self.acc.record_move(kind, ratio, accepted);
        }
        Ok(accepted)
    }

    /// One single flip proposal per field entry, then the double and global
    /// flips when their cadence is due.
    pub fn sweep(&mut self) -> Result<()> {
        let n = self.field.len();
        for step in 0..n {
            let k = match self.updater {
                Updater::Discrete => step,
                Updater::Continuous => self.rng.gen_range(0..n),
            };
            let proposal = self.field.propose_single_flip(k)?;
            self.try_move(MoveKind::Single, proposal)?;
        }
        self.n_sweeps += 1;
        if self.double_flip > 0 && n > 1 && self.n_sweeps % self.double_flip == 0 {
            let first = self.rng.gen_range(0..n);
            let mut second = self.rng.gen_range(0..n - 1);
            if second >= first {
                second += 1;
            }
            let proposal = self.field.propose_double_flip(first, second)?;
            self.try_move(MoveKind::Double, proposal)?;
        }
        if self.global_flip > 0 && self.n_sweeps % self.global_flip == 0 {
            let proposal = self.field.propose_global_flip()?;
            self.try_move(MoveKind::Global, proposal)?;
        }
        Ok(())
    }

    fn measure(&mut self) {
        let greens: Vec<&SquareMatrix> = self.engine.greens().iter().map(|g| g.matrix()).collect();
        self.acc.measure(&greens, self.sign);
    }

    /// Runs both phases and returns the normalised estimate.
    pub fn run(mut self, budget: &SamplingBudget) -> Result<SamplerOutput> {
        let start = Instant::now();
        let expired = |start: &Instant| budget.max_time.map_or(false, |t| start.elapsed() >= t);

        info!("Starting the thermalization phase.");
        self.phase = SamplerPhase::Thermalizing;
        for _ in 0..budget.therm {
            self.sweep()?;
            if expired(&start) {
                warn!("Time budget exhausted during thermalization after {} sweeps.", self.n_sweeps);
                break;
            }
        }

        info!("Starting the sampling phase.");
        self.phase = SamplerPhase::Sampling;
        self.acc.reset();
        let therm_sweeps = self.n_sweeps;
        if !expired(&start) {
            for sweep in 1..=budget.sweeps {
                self.sweep()?;
                if sweep % budget.n_meas == 0 {
                    self.measure();
                }
                if expired(&start) {
                    info!("Time budget exhausted after {} sampling sweeps.", sweep);
                    break;
                }
            }
        }
        if self.acc.n_measurements == 0 {
            self.measure();
        }
        self.phase = SamplerPhase::Finished;
        self.field.finalize();

        let g = self.acc.finalize();
        let max_lag = (self.acc.series.len() / 2).max(1);
        let gamma = autocorrelation_function(&self.acc.series, max_lag);
        let moves = self.acc.single.proposed + self.acc.double.proposed;
        let accepted = self.acc.single.accepted + self.acc.double.accepted;
        let diagnostics = SolverDiagnostics {
            acceptance_rate: if moves > 0 { accepted as f64 / moves as f64 } else { 0.0 },
            global_acceptance_rate: self.acc.global.rate(),
            mean_sign: self.acc.mean_sign(),
            autocorrelation_time: sokal_tau(&gamma),
            n_measurements: self.acc.n_measurements,
            n_sweeps: self.n_sweeps - therm_sweeps,
            negative_ratios: self.acc.negative_ratios,
            forced_resyncs: self.engine.forced_resyncs,
            drift_warnings: self.engine.drift_warnings,
            max_drift: self.engine.max_drift,
            elapsed: start.elapsed().as_secs_f64(),
            observable_series: std::mem::take(&mut self.acc.series),
        };
        debug!("Sampler finished: {:?}", diagnostics.summary());
        Ok(SamplerOutput { g, diagnostics })
    }
}

#[cfg(test)]
mod test {
    use assert::close;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    use super::*;
    use crate::weiss::build_retarded_weiss;

    fn setup(params: &SolverParams) -> MetropolisSampler<SmallRng> {
        let n = params.n_tau;
        let raw: Vec<f64> = (0..n)
            .map(|l| 0.5 * <f64>::cosh(0.2 * (l as f64 - n as f64 / 2.0)) / <f64>::cosh(0.1 * n as f64))
            .collect();
        let g0 = build_retarded_weiss(&raw);
        let field = IsingField::seeded(n, 1, 0.5, 2.0, 42, 0.5).unwrap();
        MetropolisSampler::new(SmallRng::seed_from_u64(42), field, vec![g0.clone(), g0], params).unwrap()
    }

    #[test]
    fn same_seed_same_chain() {
        let params = SolverParams { n_tau: 8, sweeps: 60, therm: 20, n_meas: 2, double_flip: 3, ..Default::default() };
        let budget = SamplingBudget::from_params(&params);
        let a = setup(&params).run(&budget).unwrap();
        let b = setup(&params).run(&budget).unwrap();
        assert_eq!(a.g, b.g);
        assert_eq!(a.diagnostics.observable_series, b.diagnostics.observable_series);
        assert_eq!(a.diagnostics.n_measurements, 30);
        assert_eq!(a.diagnostics.n_sweeps, 60);
    }

    #[test]
    fn phases() {
        let params = SolverParams { n_tau: 8, sweeps: 4, therm: 2, n_meas: 1, ..Default::default() };
        let mut sampler = setup(&params);
        assert_eq!(sampler.phase(), SamplerPhase::Thermalizing);
        sampler.sweep().unwrap();
        assert_eq!(sampler.accumulator().n_measurements, 0);
        let out = sampler.run(&SamplingBudget::from_params(&params)).unwrap();
        assert!(out.diagnostics.acceptance_rate > 0.0);
        assert!(<f64>::abs(out.diagnostics.mean_sign) <= 1.0);
    }

    #[test]
    fn expired_budget_still_measures() {
        let params = SolverParams { n_tau: 8, sweeps: 1_000_000, therm: 10, n_meas: 1000, ..Default::default() };
        let mut budget = SamplingBudget::from_params(&params);
        budget.max_time = Some(Duration::from_nanos(1));
        let out = setup(&params).run(&budget).unwrap();
        assert_eq!(out.diagnostics.n_measurements, 1);
        assert!(out.g[0].iter().all(|x| x.is_finite()));
    }

    /// Up kernel $3I$ with $\lambda>\ln 1.5$, every single flip has a
    /// negative weight ratio. The down kernel is the identity.
    fn frustrated(n: usize) -> MetropolisSampler<SmallRng> {
        let params = SolverParams { n_tau: n, ..Default::default() };
        let field = IsingField::seeded(n, 1, 0.5, 2.0, 42, 0.5).unwrap();
        let mut up = SquareMatrix::identity(n);
        for k in 0..n {
            up.set(k, k, 3.0);
        }
        MetropolisSampler::new(SmallRng::seed_from_u64(7), field, vec![up, SquareMatrix::identity(n)], &params)
            .unwrap()
    }

    #[test]
    fn negative_ratios_flip_the_sign() {
        let n = 4;
        let mut sampler = frustrated(n);
        sampler.phase = SamplerPhase::Sampling;
        let mut expected = 1.0;
        let mut sign_sum = 0.0;
        let mut accepted = 0;
        for step in 0..20 {
            let proposal = sampler.field.propose_single_flip(step % n).unwrap();
            if sampler.try_move(MoveKind::Single, proposal).unwrap() {
                expected = -expected;
                accepted += 1;
            }
            assert_eq!(sampler.sign, expected);
            sampler.measure();
            sign_sum += expected;
        }
        assert!(accepted > 0);
        assert_eq!(sampler.acc.single.accepted, accepted);
        assert_eq!(sampler.acc.negative_ratios, 20);
        close(sampler.acc.mean_sign(), sign_sum / 20.0, 1e-15);
    }

    #[test]
    fn failed_ratio_releases_the_field() {
        let mut sampler = frustrated(4);
        // Field longer than the kernels, the global ratio cannot be formed.
        sampler.field = IsingField::seeded(6, 1, 0.5, 2.0, 42, 0.5).unwrap();
        let proposal = sampler.field.propose_global_flip().unwrap();
        assert!(sampler.try_move(MoveKind::Global, proposal).is_err());
        assert_eq!(sampler.field.state(), crate::ising::FieldState::Rejected);
        assert!(sampler.field.propose_single_flip(0).is_ok());
    }

    #[test]
    fn heat_bath_and_continuous() {
        let params = SolverParams {
            n_tau: 8,
            sweeps: 20,
            therm: 5,
            n_meas: 1,
            updater: Updater::Continuous,
            acceptance: AcceptanceRule::HeatBath,
            ..Default::default()
        };
        let out = setup(&params).run(&SamplingBudget::from_params(&params)).unwrap();
        assert_eq!(out.diagnostics.n_measurements, 20);
        assert!(out.diagnostics.acceptance_rate < 1.0);
    }
}
