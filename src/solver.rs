use log::{debug, info};
use rand::Rng;
use rand_mt::Mt64;

use crate::errors::{DmftError, Result};
use crate::green::GreenTau;
use crate::grid::ImaginaryTimeGrid;
use crate::ising::IsingField;
use crate::linalg::invert_complex;
use crate::matsubara::Tail;
use crate::monte_carlo::{MetropolisSampler, SamplingBudget};
use crate::params::SolverParams;
use crate::weiss::build_block_weiss;

/// Statistics returned with every impurity solution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolverDiagnostics {
    pub acceptance_rate: f64,
    pub global_acceptance_rate: f64,
    pub mean_sign: f64,
    pub autocorrelation_time: f64,
    pub n_measurements: usize,
    pub n_sweeps: usize,
    pub negative_ratios: usize,
    pub forced_resyncs: usize,
    pub drift_warnings: usize,
    pub max_drift: f64,
    /// Wall time of the solve, in seconds.
    pub elapsed: f64,
    pub observable_series: Vec<f64>,
}

/// Keys of [`SolverDiagnostics::summary`], in order.
pub const DIAGNOSTIC_KEYS: [&str; 11] = [
    "acceptance_rate",
    "global_acceptance_rate",
    "mean_sign",
    "autocorrelation_time",
    "n_measurements",
    "n_sweeps",
    "negative_ratios",
    "forced_resyncs",
    "drift_warnings",
    "max_drift",
    "elapsed",
];

impl SolverDiagnostics {
    /// Scalar statistics as `(key, value)`, the series is left out.
    pub fn summary(&self) -> Vec<(&'static str, f64)> {
        DIAGNOSTIC_KEYS.iter().copied().zip(self.values()).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        vec![
            self.acceptance_rate,
            self.global_acceptance_rate,
            self.mean_sign,
            self.autocorrelation_time,
            self.n_measurements as f64,
            self.n_sweeps as f64,
            self.negative_ratios as f64,
            self.forced_resyncs as f64,
            self.drift_warnings as f64,
            self.max_drift,
            self.elapsed,
        ]
    }

    /// Inverse of [`SolverDiagnostics::values`]. Counters are rounded.
    pub fn from_values(values: &[f64], observable_series: Vec<f64>) -> Result<Self> {
        if values.len() != DIAGNOSTIC_KEYS.len() {
            return Err(DmftError::configuration(format!(
                "Expected {} diagnostic values, got {}.",
                DIAGNOSTIC_KEYS.len(),
                values.len()
            )));
        }
        let count = |x: f64| <f64>::round(x) as usize;
        Ok(SolverDiagnostics {
            acceptance_rate: values[0],
            global_acceptance_rate: values[1],
            mean_sign: values[2],
            autocorrelation_time: values[3],
            n_measurements: count(values[4]),
            n_sweeps: count(values[5]),
            negative_ratios: count(values[6]),
            forced_resyncs: count(values[7]),
            drift_warnings: count(values[8]),
            max_drift: values[9],
            elapsed: values[10],
            observable_series,
        })
    }
}

/// `solve(G0) -> G`, interchangeable between the sampling and the
/// perturbative strategies. Both sides use the standard sign convention,
/// $G(\tau)\leq0$.
pub trait ImpuritySolver {
    fn solve(&mut self, weiss: &GreenTau) -> Result<(GreenTau, SolverDiagnostics)>;

    /// Replaces the sampling budget, used for the production run.
    fn set_budget(&mut self, _budget: SamplingBudget) {}

    fn name(&self) -> &'static str;
}

/// Hirsch-Fye quantum Monte Carlo.
pub struct HirschFyeSolver {
    u: f64,
    params: SolverParams,
    budget: SamplingBudget,
    rng: Mt64,
}

impl HirschFyeSolver {
    pub fn new(u: f64, params: &SolverParams) -> Self {
        HirschFyeSolver {
            u,
            params: params.clone(),
            budget: SamplingBudget::from_params(params),
            rng: Mt64::new(params.seed),
        }
    }

    /// Independent chain `rank` of a group, seeded with `seed + rank`.
    pub fn for_rank(u: f64, params: &SolverParams, rank: usize) -> Self {
        let params = SolverParams { seed: params.seed.wrapping_add(rank as u64), ..params.clone() };
        Self::new(u, &params)
    }

    pub fn budget(&self) -> &SamplingBudget {
        &self.budget
    }
}

impl ImpuritySolver for HirschFyeSolver {
    fn solve(&mut self, weiss: &GreenTau) -> Result<(GreenTau, SolverDiagnostics)> {
        let grid = ImaginaryTimeGrid::new(weiss.beta, weiss.n_tau)?;
        if weiss.n_tau != self.params.n_tau {
            return Err(DmftError::configuration(format!(
                "Weiss field has {} slices, the solver is set up for {}.",
                weiss.n_tau, self.params.n_tau
            )));
        }
        let sites = weiss.sites;
        let l = grid.n_slices();
        // The kernel works with g = -G.
        let raw: Vec<f64> = weiss.data.iter().map(|x| -x).collect();
        let g0 = build_block_weiss(&raw, sites, l);
        let field_seed = self.rng.gen::<u64>();
        let field = IsingField::seeded(l, sites, grid.dtau(), self.u, field_seed, self.params.spin_polarization)?;
        info!(
            "Hirsch-Fye solve, U = {}, L = {}, sites = {}, lambda = {:.4}.",
            self.u,
            l,
            sites,
            field.lambda()
        );
        let sampler = MetropolisSampler::new(&mut self.rng, field, vec![g0.clone(), g0], &self.params)?;
        let out = sampler.run(&self.budget)?;
        let data: Vec<f64> = out.g[0]
            .iter()
            .zip(out.g[1].iter())
            .map(|(up, down)| -0.5 * (up + down))
            .collect();
        debug!(
            "Acceptance rate {:.3}, mean sign {:.3}, autocorrelation time {:.2}.",
            out.diagnostics.acceptance_rate, out.diagnostics.mean_sign, out.diagnostics.autocorrelation_time
        );
        Ok((GreenTau::from_data(weiss.beta, sites, l, data)?, out.diagnostics))
    }

    fn set_budget(&mut self, budget: SamplingBudget) {
        self.budget = budget;
    }

    fn name(&self) -> &'static str {
        "hirsch-fye"
    }
}

/// Second order perturbation theory around the Weiss field,
/// $\Sigma_{ab}(\tau)=-U^2G^0_{ab}(\tau)^2G^0_{ba}(-\tau)$.
pub struct IptSolver {
    u: f64,
}

impl IptSolver {
    pub fn new(u: f64) -> Self {
        IptSolver { u }
    }

    /// $\Sigma_{ab}$ on the grid and at $\beta^-$.
    fn self_energy(&self, weiss: &GreenTau) -> (GreenTau, Vec<f64>) {
        let sites = weiss.sites;
        let n = weiss.n_tau;
        let u2 = self.u * self.u;
        let mut sigma = GreenTau::zeros(weiss.beta, sites, n);
        let mut at_beta = vec![0.0; sites * sites];
        for a in 0..sites {
            for b in 0..sites {
                let jump = if a == b { 1.0 } else { 0.0 };
                let gab = weiss.block(a, b);
                let gba = weiss.block(b, a);
                // G0_ba(-tau) = -G0_ba(beta - tau), G0(beta^-) = -jump - G0(0^+)
                let gba_minus = |l: usize| if l == 0 { jump + gba[0] } else { -gba[n - l] };
                let out = sigma.block_mut(a, b);
                for l in 0..n {
                    out[l] = -u2 * gab[l] * gab[l] * gba_minus(l);
                }
                let gab_beta = -jump - gab[0];
                // G0_ba(-beta^+) = -G0_ba(0^+)
                at_beta[a * sites + b] = u2 * gab_beta * gab_beta * gba[0];
            }
        }
        (sigma, at_beta)
    }
}

impl ImpuritySolver for IptSolver {
    fn solve(&mut self, weiss: &GreenTau) -> Result<(GreenTau, SolverDiagnostics)> {
        let grid = ImaginaryTimeGrid::new(weiss.beta, weiss.n_tau)?;
        let sites = weiss.sites;
        let n_freq = (grid.n_slices() / 2).max(1);
        let (sigma, at_beta) = self.self_energy(weiss);

        let mut weiss_tails = Vec::with_capacity(sites * sites);
        let mut sigma_tails = Vec::with_capacity(sites * sites);
        for a in 0..sites {
            for b in 0..sites {
                weiss_tails.push(Tail::from_endpoints(weiss.block(a, b), grid.dtau(), a == b));
                let s0 = sigma.block(a, b)[0];
                sigma_tails.push(Tail::new(-(s0 + at_beta[a * sites + b]), 0.0, 0.0));
            }
        }
        let g0_iw = weiss.to_matsubara(n_freq, &weiss_tails);
        let sigma_iw = sigma.to_matsubara(n_freq, &sigma_tails);

        let mut g_iw = g0_iw.clone();
        for k in 0..n_freq {
            let mut dyson = invert_complex(&g0_iw.matrix_at(k), sites)?;
            for (d, s) in dyson.iter_mut().zip(sigma_iw.matrix_at(k)) {
                *d -= s;
            }
            g_iw.set_matrix_at(k, &invert_complex(&dyson, sites)?);
        }
        // Sigma only enters from 1/(iw)^3 on.
        let g_tau = g_iw.to_tau(grid.n_slices(), &weiss_tails);
        let diagnostics = SolverDiagnostics { mean_sign: 1.0, ..Default::default() };
        debug!("IPT solve, U = {}, Sigma(0+) = {:.4}.", self.u, sigma.data[0]);
        Ok((g_tau, diagnostics))
    }

    fn name(&self) -> &'static str {
        "ipt"
    }
}

#[cfg(test)]
mod test {
    use assert::close;
    use num::complex::Complex64;

    use super::*;
    use crate::matsubara::{gw_invfouriertrans, matsubara_frequencies, semicircle};

    fn bethe_weiss(beta: f64, n_tau: usize) -> GreenTau {
        let wn = matsubara_frequencies(beta, 4 * n_tau);
        let g = semicircle(&wn, 0.0, 1.0);
        let g0: Vec<Complex64> = g
            .iter()
            .zip(wn.iter())
            .map(|(g, &w)| 1.0 / (Complex64::new(0.0, w) - 0.25 * g))
            .collect();
        let taus: Vec<f64> = (0..n_tau).map(|l| l as f64 * beta / n_tau as f64).collect();
        let data = gw_invfouriertrans(&g0, &taus, &wn, &Tail::new(1.0, 0.0, 0.0), beta);
        GreenTau::scalar(beta, data)
    }

    #[test]
    fn diagnostics_round_trip() {
        let d = SolverDiagnostics { acceptance_rate: 0.4, n_sweeps: 12, max_drift: 1e-13, ..Default::default() };
        let back = SolverDiagnostics::from_values(&d.values(), vec![]).unwrap();
        assert_eq!(d, back);
        assert_eq!(d.summary()[5], ("n_sweeps", 12.0));
        assert!(SolverDiagnostics::from_values(&[1.0], vec![]).is_err());
    }

    #[test]
    fn ipt_without_interaction_is_weiss() {
        let weiss = bethe_weiss(16.0, 512);
        let (g, _) = IptSolver::new(0.0).solve(&weiss).unwrap();
        for (a, b) in g.data.iter().zip(weiss.data.iter()) {
            close(*a, *b, 2e-3);
        }
    }

    #[test]
    fn ipt_keeps_half_filling() {
        let weiss = bethe_weiss(16.0, 512);
        let (g, _) = IptSolver::new(2.0).solve(&weiss).unwrap();
        close(g.data[0], -0.5, 5e-3);
        // Particle-hole symmetry, G(tau) = G(beta - tau).
        close(g.data[100], g.data[412], 5e-3);
        assert!(g.data.iter().all(|x| *x < 0.0));
    }

    #[test]
    fn wrong_slice_count() {
        let weiss = bethe_weiss(16.0, 16);
        let params = SolverParams { n_tau: 32, ..Default::default() };
        assert!(HirschFyeSolver::new(2.0, &params).solve(&weiss).is_err());
    }
}
