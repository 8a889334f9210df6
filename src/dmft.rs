use log::{debug, error, info, warn};
use std::thread;
use std::time::Duration;

use crate::archive::{Archive, IterationRecord};
use crate::comm::{Communicator, LocalGroup, Role};
use crate::errors::{DmftError, Result};
use crate::green::{GreenTau, MatsubaraGreen};
use crate::lattice::SelfConsistency;
use crate::monte_carlo::SamplingBudget;
use crate::params::DmftParams;
use crate::solver::{ImpuritySolver, SolverDiagnostics};

/// Rank taking the decisions.
pub const COORDINATOR_RANK: usize = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Initialized,
    Iterating,
    Converged,
    MaxIterReached,
}

/// Final state of a loop. Not converging is an outcome, not an error.
#[derive(Debug, Clone)]
pub struct DmftOutcome {
    pub state: LoopState,
    pub iterations: usize,
    pub distances: Vec<f64>,
    pub green_iw: MatsubaraGreen,
    pub green_tau: Option<GreenTau>,
    pub weiss_tau: Option<GreenTau>,
    pub diagnostics: SolverDiagnostics,
}

/// Fixed point iteration $G\to G^0\to G$.
pub struct DmftLoop<S, L, C> {
    params: DmftParams,
    solver: S,
    lattice: L,
    comm: C,
    role: Role,
    archive: Option<Archive>,
    state: LoopState,
    iteration: usize,
    green_iw: MatsubaraGreen,
    green_tau: Option<GreenTau>,
    weiss_tau: Option<GreenTau>,
    diagnostics: SolverDiagnostics,
    distances: Vec<f64>,
}

fn log_parameters(params: &DmftParams) {
    info!("System parameter BETA = {}", params.model.beta);
    info!("System parameter U = {}", params.model.u);
    info!("System parameter MU = {}", params.model.mu);
    info!("System parameter L = {}", params.solver.n_tau);
    debug!("System parameter N_MATSUBARA = {}", params.model.n_matsubara);
    debug!("System parameter t = {}, tp = {}, tab = {}", params.model.t, params.model.tp, params.model.tab);
    debug!(
        "System parameter sweeps = {}, therm = {}, N_meas = {}",
        params.solver.sweeps, params.solver.therm, params.solver.n_meas
    );
    debug!("System parameter max_loops = {}", params.dmft.max_loops);
    debug!("System parameter convergence_tol = {:e}", params.dmft.convergence_tol);
}

impl<S, L, C> DmftLoop<S, L, C>
where
    S: ImpuritySolver,
    L: SelfConsistency,
    C: Communicator,
{
    /// Every rank may hold a read handle on the archive, only the
    /// coordinator writes.
    pub fn new(
        params: &DmftParams,
        solver: S,
        lattice: L,
        comm: C,
        role: Role,
        archive: Option<Archive>,
    ) -> Result<Self> {
        params.validate()?;
        if lattice.sites() != params.model.sites {
            return Err(DmftError::configuration(format!(
                "Lattice has {} sites, parameters ask for {}.",
                lattice.sites(),
                params.model.sites
            )));
        }
        if (role == Role::Coordinator) != (comm.rank() == COORDINATOR_RANK) {
            return Err(DmftError::configuration(format!(
                "Rank {} cannot take the role {:?}.",
                comm.rank(),
                role
            )));
        }
        let green_iw = lattice.initial_guess(params.model.beta, params.model.n_matsubara, params.model.mu);
        Ok(DmftLoop {
            params: params.clone(),
            solver,
            lattice,
            comm,
            role,
            archive,
            state: LoopState::Initialized,
            iteration: 0,
            green_iw,
            green_tau: None,
            weiss_tau: None,
            diagnostics: SolverDiagnostics::default(),
            distances: Vec::new(),
        })
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Index of the next iteration.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn distances(&self) -> &[f64] {
        &self.distances
    }

    pub fn green_iw(&self) -> &MatsubaraGreen {
        &self.green_iw
    }

    /// Restores the last persisted iteration, returns its index.
    pub fn resume(&mut self) -> Result<usize> {
        let archive = self
            .archive
            .as_ref()
            .ok_or_else(|| DmftError::configuration("Cannot resume without an archive."))?;
        let last = archive.last_iteration()?.ok_or(DmftError::MissingIteration { iteration: 0 })?;
        let record = archive.read_iteration(last)?;
        if record.green_iw.sites != self.params.model.sites
            || record.green_iw.n_freq != self.params.model.n_matsubara
            || record.green_tau.n_tau != self.params.solver.n_tau
        {
            return Err(DmftError::configuration(format!(
                "Iteration {} in group {} does not match the current parameters.",
                last,
                archive.group()
            )));
        }
        info!("Resuming from iteration {} with distance {:.3e}.", last, record.distance);
        self.green_iw = record.green_iw;
        self.green_tau = Some(record.green_tau);
        self.weiss_tau = Some(record.weiss_tau);
        self.diagnostics = record.diagnostics;
        self.distances = vec![record.distance];
        self.iteration = last + 1;
        self.state = if record.converged { LoopState::Converged } else { LoopState::Iterating };
        Ok(last)
    }

    fn weiss_tau(&self) -> Result<GreenTau> {
        let mu = self.params.model.mu;
        let g0_iw = self.lattice.weiss_field(&self.green_iw, mu)?;
        Ok(g0_iw.to_tau(self.params.solver.n_tau, &self.lattice.weiss_tails(mu)))
    }

    /// One self-consistency iteration, returns the distance to the previous
    /// Green's function.
    pub fn step(&mut self) -> Result<f64> {
        self.iterate(false)
    }

    fn iterate(&mut self, production: bool) -> Result<f64> {
        if !production {
            self.state = LoopState::Iterating;
        }
        let mu = self.params.model.mu;
        let weiss_tau = self.weiss_tau()?;

        let solved = self.solver.solve(&weiss_tau);
        let mut failed = [if solved.is_err() { 1.0 } else { 0.0 }];
        self.comm.all_reduce_mean(&mut failed);
        let (mut green_tau, diagnostics) = solved?;
        if failed[0] > 0.0 {
            return Err(DmftError::configuration(format!(
                "Another worker failed during iteration {}.",
                self.iteration
            )));
        }

        self.comm.all_reduce_mean(&mut green_tau.data);
        let mut values = diagnostics.values();
        self.comm.all_reduce_mean(&mut values);
        let diagnostics = SolverDiagnostics::from_values(&values, diagnostics.observable_series)?;

        if self.params.dmft.mixing < 1.0 {
            if let Some(previous) = &self.green_tau {
                green_tau.mix(previous, self.params.dmft.mixing);
            }
        }
        let green_iw = green_tau.to_matsubara(self.params.model.n_matsubara, &self.lattice.green_tails(mu));
        let distance = green_iw.max_abs_diff(&self.green_iw, self.params.dmft.convergence_window);
        let converged = distance < self.params.dmft.convergence_tol;
        info!(
            "Iteration {} ({}), distance {:.3e}, mean sign {:.3}.",
            self.iteration,
            self.solver.name(),
            distance,
            diagnostics.mean_sign
        );

        let record = IterationRecord {
            iteration: self.iteration,
            weiss_tau,
            green_tau,
            green_iw,
            diagnostics,
            distance,
            converged,
            production,
        };
        let persisted = match (&self.archive, self.role) {
            (Some(archive), Role::Coordinator) => archive.write_iteration(&record),
            _ => Ok(()),
        };
        if let Err(e) = &persisted {
            error!("Could not persist iteration {}: {}", self.iteration, e);
        }
        let persisted_everywhere = self.comm.broadcast_flag(COORDINATOR_RANK, persisted.is_ok());
        persisted?;
        if !persisted_everywhere {
            return Err(DmftError::archive(format!(
                "Coordinator failed to persist iteration {}.",
                self.iteration
            )));
        }
        let converged = self.comm.broadcast_flag(COORDINATOR_RANK, converged);
        self.comm.barrier();

        self.green_iw = record.green_iw;
        self.green_tau = Some(record.green_tau);
        self.weiss_tau = Some(record.weiss_tau);
        self.diagnostics = record.diagnostics;
        self.distances.push(distance);
        self.iteration += 1;
        if converged && !production {
            self.state = LoopState::Converged;
        }
        Ok(distance)
    }

    /// Longer sampling run from the current solution, persisted as the last
    /// record.
    pub fn production(&mut self) -> Result<f64> {
        let solver_params = &self.params.solver;
        let factor = self.params.dmft.production_sweeps as f64 / solver_params.sweeps as f64;
        let budget = SamplingBudget {
            sweeps: self.params.dmft.production_sweeps,
            therm: solver_params.therm,
            n_meas: solver_params.n_meas,
            max_time: solver_params.max_time.map(|t| Duration::from_secs_f64(t * factor.max(1.0))),
        };
        info!("Starting the production run, {} sweeps.", budget.sweeps);
        self.solver.set_budget(budget);
        self.iterate(true)
    }

    pub fn run(&mut self) -> Result<DmftOutcome> {
        log_parameters(&self.params);
        while self.state != LoopState::Converged && self.iteration < self.params.dmft.max_loops {
            self.step()?;
        }
        if self.state != LoopState::Converged {
            self.state = LoopState::MaxIterReached;
            warn!(
                "No convergence after {} iterations, last distance {:.3e} > {:e}.",
                self.iteration,
                self.distances.last().copied().unwrap_or(<f64>::INFINITY),
                self.params.dmft.convergence_tol
            );
        } else {
            info!("Converged after {} iterations.", self.iteration);
        }
        if self.params.dmft.production_sweeps > 0 {
            self.production()?;
        }
        Ok(self.outcome())
    }

    pub fn outcome(&self) -> DmftOutcome {
        DmftOutcome {
            state: self.state,
            iterations: self.iteration,
            distances: self.distances.clone(),
            green_iw: self.green_iw.clone(),
            green_tau: self.green_tau.clone(),
            weiss_tau: self.weiss_tau.clone(),
            diagnostics: self.diagnostics.clone(),
        }
    }
}

/// Runs the loop with one thread per Markov chain. `make_solver(rank)` builds
/// each chain's solver, `resume` restarts from the archive. Returns the
/// coordinator's outcome.
pub fn run_with_workers<S, L, F>(
    params: &DmftParams,
    lattice: L,
    workers: usize,
    archive: Option<Archive>,
    resume: bool,
    make_solver: F,
) -> Result<DmftOutcome>
where
    S: ImpuritySolver,
    L: SelfConsistency + Clone + Send,
    F: Fn(usize) -> S + Sync,
{
    let group = LocalGroup::new(workers);
    let results: Vec<Result<DmftOutcome>> = thread::scope(|s| {
        let handles: Vec<_> = group
            .into_iter()
            .map(|comm| {
                let lattice = lattice.clone();
                let archive = archive.clone();
                let make_solver = &make_solver;
                s.spawn(move || -> Result<DmftOutcome> {
                    let rank = comm.rank();
                    let role = Role::from_rank(rank);
                    let mut dmft = DmftLoop::new(params, make_solver(rank), lattice, comm, role, archive)?;
                    if resume {
                        dmft.resume()?;
                    }
                    dmft.run()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| {
                h.join()
                    .unwrap_or_else(|_| Err(DmftError::configuration("A worker thread panicked.")))
            })
            .collect()
    });
    let mut coordinator = None;
    for (rank, result) in results.into_iter().enumerate() {
        match result {
            Ok(outcome) if rank == COORDINATOR_RANK => coordinator = Some(outcome),
            Ok(_) => {}
            Err(e) => return Err(e),
        }
    }
    coordinator.ok_or_else(|| DmftError::configuration("No coordinator outcome."))
}
