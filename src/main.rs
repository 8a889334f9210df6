use clap::Parser;
use colored::Colorize;
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;

use hfdmft::archive::Archive;
use hfdmft::lattice::{BetheLattice, DimerBethe, SelfConsistency};
use hfdmft::params::{LatticeKind, SolverKind};
use hfdmft::parse::params::parse_params_def;
use hfdmft::solver::{HirschFyeSolver, IptSolver};
use hfdmft::{run_with_workers, DmftOutcome, DmftParams, LoopState, Result};

#[derive(Parser, Debug)]
#[command(version, about = "Hirsch-Fye DMFT self-consistency loop", long_about = None)]
struct Args {
    /// Parameter file, key,value csv
    params: PathBuf,

    /// Independent Markov chains, one thread each
    #[arg(short, long, default_value_t = 1)]
    workers: usize,

    /// Archive root directory
    #[arg(short, long, default_value = "dmft_out")]
    output: PathBuf,

    /// Group of the run inside the archive
    #[arg(short, long)]
    group: Option<String>,

    /// Restart from the last stored iteration of the group
    #[arg(short, long)]
    resume: bool,
}

fn solve_lattice<L>(
    params: &DmftParams,
    lattice: L,
    workers: usize,
    archive: Archive,
    resume: bool,
) -> Result<DmftOutcome>
where
    L: SelfConsistency + Clone + Send,
{
    let u = params.model.u;
    match params.solver.kind {
        SolverKind::HirschFye => run_with_workers(params, lattice, workers, Some(archive), resume, |rank| {
            HirschFyeSolver::for_rank(u, &params.solver, rank)
        }),
        SolverKind::Ipt => {
            run_with_workers(params, lattice, workers, Some(archive), resume, |_| IptSolver::new(u))
        }
    }
}

fn run(args: &Args) -> Result<DmftOutcome> {
    let params = parse_params_def(&args.params)?;
    let group = args.group.clone().unwrap_or_else(|| {
        format!("B{}_U{}_MU{}", params.model.beta, params.model.u, params.model.mu)
    });
    let archive = Archive::open(&args.output, &group, params.solver.save_logs)?;
    info!("Writing iterations to {}", archive.group_dir().display());
    let m = &params.model;
    match m.lattice {
        LatticeKind::Bethe => solve_lattice(&params, BetheLattice { t: m.t }, args.workers, archive, args.resume),
        LatticeKind::Dimer => solve_lattice(
            &params,
            DimerBethe { t: m.t, tp: m.tp, tab: m.tab },
            args.workers,
            archive,
            args.resume,
        ),
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    let outcome = match run(&args) {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", e.to_string().red());
            return ExitCode::FAILURE;
        }
    };
    let status = match outcome.state {
        LoopState::Converged => format!("Converged in {} iterations", outcome.iterations).green(),
        _ => format!("Not converged after {} iterations", outcome.iterations).yellow(),
    };
    println!("{}", status);
    if let Some(last) = outcome.distances.last() {
        println!("Last distance: {:.3e}", last);
    }
    println!("Mean sign: {:.4}", outcome.diagnostics.mean_sign);
    if let Some(g) = &outcome.green_tau {
        for (tau, value) in g.taus().iter().zip(g.block(0, 0)) {
            println!("{:.6} {:.8}", tau, value);
        }
    }
    ExitCode::SUCCESS
}
