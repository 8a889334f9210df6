use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::{DmftError, Result};
use crate::fast_update::UpdateTolerances;

/// Order in which the sweep visits the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Updater {
    /// Every entry once, in order.
    Discrete,
    /// As many uniformly drawn entries as the field has.
    Continuous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptanceRule {
    /// Accept if $|R|\geq1$ or $u<|R|$.
    Metropolis,
    /// Accept if $u<|R|/(1+|R|)$.
    HeatBath,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatticeKind {
    Bethe,
    Dimer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverKind {
    HirschFye,
    Ipt,
}

macro_rules! impl_enum_str {
    ($t:ty, $($name:literal => $variant:expr),+) => {
        impl FromStr for $t {
            type Err = DmftError;
            fn from_str(s: &str) -> Result<Self> {
                match s.trim().to_lowercase().as_str() {
                    $($name => Ok($variant),)+
                    other => Err(DmftError::configuration(format!(
                        "Unknown {} value '{}'.", stringify!($t), other
                    ))),
                }
            }
        }
    };
}

impl_enum_str!(Updater, "discrete" => Updater::Discrete, "continuous" => Updater::Continuous);
impl_enum_str!(AcceptanceRule, "metropolis" => AcceptanceRule::Metropolis, "heatbath" => AcceptanceRule::HeatBath, "heat_bath" => AcceptanceRule::HeatBath);
impl_enum_str!(LatticeKind, "bethe" => LatticeKind::Bethe, "dimer" => LatticeKind::Dimer);
impl_enum_str!(SolverKind, "hf" => SolverKind::HirschFye, "hirschfye" => SolverKind::HirschFye, "ipt" => SolverKind::Ipt);

/// Lattice model and temperature.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelParams {
    pub beta: f64,
    /// Positive Matsubara frequencies kept in the self-consistency.
    pub n_matsubara: usize,
    pub u: f64,
    pub mu: f64,
    /// Lattice hopping, half bandwidth $D=2t$.
    pub t: f64,
    /// Intra dimer hopping.
    pub tp: f64,
    /// Inter dimer hopping between unlike sites.
    pub tab: f64,
    pub sites: usize,
    pub lattice: LatticeKind,
}

impl Default for ModelParams {
    fn default() -> Self {
        ModelParams {
            beta: 16.0,
            n_matsubara: 16,
            u: 2.0,
            mu: 0.0,
            t: 0.5,
            tp: 0.0,
            tab: 0.0,
            sites: 1,
            lattice: LatticeKind::Bethe,
        }
    }
}

/// Hirsch-Fye sampler controls.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverParams {
    pub kind: SolverKind,
    /// Slices $L$, $\Delta\tau=\beta/L$.
    pub n_tau: usize,
    pub sweeps: usize,
    pub therm: usize,
    pub n_meas: usize,
    pub seed: u64,
    pub updater: Updater,
    pub acceptance: AcceptanceRule,
    /// Sweeps between global flips, 0 disables them.
    pub global_flip: usize,
    /// Sweeps between double flips, 0 disables them.
    pub double_flip: usize,
    /// Accepted fast updates between two clean builds.
    pub clean_update_frequency: usize,
    pub tolerance_drift: f64,
    pub tolerance_singularity: f64,
    /// Probability of $+\lambda$ in the initial field.
    pub spin_polarization: f64,
    /// Wall clock budget of one sampling phase, in seconds.
    pub max_time: Option<f64>,
    pub save_logs: bool,
}

impl Default for SolverParams {
    fn default() -> Self {
        SolverParams {
            kind: SolverKind::HirschFye,
            n_tau: 32,
            sweeps: 3000,
            therm: 1000,
            n_meas: 3,
            seed: 4213,
            updater: Updater::Discrete,
            acceptance: AcceptanceRule::Metropolis,
            global_flip: 1,
            double_flip: 0,
            clean_update_frequency: 100,
            tolerance_drift: 1e-8,
            tolerance_singularity: 1e-12,
            spin_polarization: 0.5,
            max_time: None,
            save_logs: false,
        }
    }
}

impl SolverParams {
    pub fn tolerances(&self) -> UpdateTolerances {
        UpdateTolerances {
            resync_interval: self.clean_update_frequency,
            tolerance_drift: self.tolerance_drift,
            tolerance_singularity: self.tolerance_singularity,
        }
    }

    pub fn time_budget(&self) -> Option<Duration> {
        self.max_time.map(Duration::from_secs_f64)
    }
}

/// Outer loop controls.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopParams {
    pub max_loops: usize,
    pub convergence_tol: f64,
    /// Weight of the new solution in the linear mixing.
    pub mixing: f64,
    /// Frequencies entering the convergence distance.
    pub convergence_window: usize,
    /// Sweeps of the production run after the loop, 0 skips it.
    pub production_sweeps: usize,
}

impl Default for LoopParams {
    fn default() -> Self {
        LoopParams {
            max_loops: 20,
            convergence_tol: 4e-3,
            mixing: 1.0,
            convergence_window: 20,
            production_sweeps: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DmftParams {
    pub model: ModelParams,
    pub solver: SolverParams,
    pub dmft: LoopParams,
}

fn invalid<T>(details: String) -> Result<T> {
    Err(DmftError::Configuration { details })
}

impl DmftParams {
    /// Checks every option and the combinations between them.
    pub fn validate(&self) -> Result<()> {
        let m = &self.model;
        let s = &self.solver;
        let d = &self.dmft;
        if !m.beta.is_finite() || m.beta <= 0.0 {
            return Err(DmftError::InvalidGrid { beta: m.beta, n_slices: s.n_tau });
        }
        if s.n_tau == 0 {
            return Err(DmftError::InvalidGrid { beta: m.beta, n_slices: s.n_tau });
        }
        if m.n_matsubara == 0 {
            return invalid("N_MATSUBARA must be positive.".to_owned());
        }
        if !m.u.is_finite() || m.u < 0.0 {
            return invalid(format!("U must be a non negative number, got {}.", m.u));
        }
        if !m.mu.is_finite() || !m.tp.is_finite() || !m.tab.is_finite() {
            return invalid("MU, tp and tab must be finite.".to_owned());
        }
        if !m.t.is_finite() || m.t <= 0.0 {
            return invalid(format!("t must be positive, got {}.", m.t));
        }
        match m.lattice {
            LatticeKind::Bethe if m.sites != 1 => {
                return invalid(format!("Bethe lattice has one site, got SITES = {}.", m.sites));
            }
            LatticeKind::Dimer if m.sites != 2 => {
                return invalid(format!("Dimer lattice has two sites, got SITES = {}.", m.sites));
            }
            LatticeKind::Bethe if m.tp != 0.0 || m.tab != 0.0 => {
                return invalid("tp and tab only apply to the dimer lattice.".to_owned());
            }
            _ => {}
        }
        if s.sweeps == 0 {
            return invalid("sweeps must be positive.".to_owned());
        }
        if s.n_meas == 0 {
            return invalid("N_meas must be positive.".to_owned());
        }
        if s.n_meas > s.sweeps {
            return invalid(format!(
                "N_meas = {} is larger than sweeps = {}, no measurement would be taken.",
                s.n_meas, s.sweeps
            ));
        }
        if s.clean_update_frequency == 0 {
            return invalid("clean_update_frequency must be positive.".to_owned());
        }
        if !(0.0..=1.0).contains(&s.spin_polarization) {
            return invalid(format!("spin_polarization must be in [0, 1], got {}.", s.spin_polarization));
        }
        if s.tolerance_drift <= 0.0 || s.tolerance_singularity <= 0.0 {
            return invalid("Tolerances must be positive.".to_owned());
        }
        if let Some(t) = s.max_time {
            if !t.is_finite() || t <= 0.0 {
                return invalid(format!("MAX_TIME must be positive, got {}.", t));
            }
        }
        if s.double_flip > 0 && s.n_tau * m.sites < 2 {
            return invalid("Double flips need at least two field entries.".to_owned());
        }
        if d.max_loops == 0 {
            return invalid("max_loops must be positive.".to_owned());
        }
        if !d.convergence_tol.is_finite() || d.convergence_tol <= 0.0 {
            return invalid(format!("convergence_tol must be positive, got {}.", d.convergence_tol));
        }
        if !(d.mixing > 0.0 && d.mixing <= 1.0) {
            return invalid(format!("mixing must be in (0, 1], got {}.", d.mixing));
        }
        if d.convergence_window == 0 {
            return invalid("convergence_window must be positive.".to_owned());
        }
        Ok(())
    }

    /// $\Delta\tau=\beta/L$.
    pub fn dtau(&self) -> f64 {
        self.model.beta / self.solver.n_tau as f64
    }
}

impl fmt::Display for DmftParams {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "BETA = {}, U = {}, MU = {}, t = {}, tp = {}, tab = {}, L = {}, sweeps = {}",
            self.model.beta,
            self.model.u,
            self.model.mu,
            self.model.t,
            self.model.tp,
            self.model.tab,
            self.solver.n_tau,
            self.solver.sweeps
        )
    }
}
