use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::path::PathBuf;

use hfdmft::archive::Archive;
use hfdmft::comm::{Role, SingleProcess};
use hfdmft::lattice::DimerBethe;
use hfdmft::params::LatticeKind;
use hfdmft::solver::HirschFyeSolver;
use hfdmft::{DmftLoop, DmftOutcome, DmftParams, LoopState, Result};

/// Interaction scan on the dimer Bethe lattice, one loop per thread.
#[derive(Parser, Debug)]
#[command(version, about = "Hirsch-Fye DMFT of the dimer Bethe lattice", long_about = None)]
struct Args {
    /// Inverse temperature
    beta: f64,

    /// Interactions to visit
    #[arg(short, long, num_args = 1.., default_values_t = [1.0, 2.0, 3.0])]
    u: Vec<f64>,

    /// Intra dimer hopping
    #[arg(long, default_value_t = 0.3)]
    tp: f64,

    /// Inter dimer hopping between unlike sites
    #[arg(long, default_value_t = 0.0)]
    tab: f64,

    /// Time slices
    #[arg(short = 'l', long, default_value_t = 32)]
    slices: usize,

    /// Sweeps per solve
    #[arg(short, long, default_value_t = 3000)]
    sweeps: usize,

    /// Archive root, one group per interaction
    #[arg(short, long, default_value = "hf_dimer")]
    output: PathBuf,
}

fn solve(args: &Args, u: f64) -> Result<DmftOutcome> {
    let mut params = DmftParams::default();
    params.model.beta = args.beta;
    params.model.u = u;
    params.model.tp = args.tp;
    params.model.tab = args.tab;
    params.model.sites = 2;
    params.model.lattice = LatticeKind::Dimer;
    params.solver.n_tau = args.slices;
    params.solver.sweeps = args.sweeps;
    params.solver.therm = args.sweeps / 3;
    let lattice = DimerBethe { t: params.model.t, tp: args.tp, tab: args.tab };
    let solver = HirschFyeSolver::new(u, &params.solver);
    let archive = Archive::open(&args.output, &format!("U{}_tp{}", u, args.tp), params.solver.save_logs)?;
    let mut dmft = DmftLoop::new(&params, solver, lattice, SingleProcess, Role::Coordinator, Some(archive))?;
    dmft.run()
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let bar = ProgressBar::new(args.u.len() as u64);
    bar.set_prefix("Dimer U scan: ");
    if let Ok(style) =
        ProgressStyle::with_template("[{elapsed_precise}] {prefix} {bar:40.cyan/blue} {pos:>3}/{len:3}")
    {
        bar.set_style(style.progress_chars("##-"));
    }

    let rows: Vec<(f64, Result<DmftOutcome>)> = args
        .u
        .par_iter()
        .map(|&u| {
            let out = solve(&args, u);
            bar.inc(1);
            (u, out)
        })
        .collect();
    bar.finish_and_clear();

    println!("{:>6} {:>12} {:>12} {:>8}", "U", "G_11(b/2)", "G_12(b/2)", "loops");
    for (u, outcome) in rows {
        match outcome {
            Ok(outcome) => {
                let (diag, off) = outcome
                    .green_tau
                    .as_ref()
                    .map(|g| (g.block(0, 0)[g.n_tau / 2], g.block(0, 1)[g.n_tau / 2]))
                    .unwrap_or((<f64>::NAN, <f64>::NAN));
                let line = format!("{:>6.2} {:>12.6} {:>12.6} {:>8}", u, diag, off, outcome.iterations);
                match outcome.state {
                    LoopState::Converged => println!("{}", line.green()),
                    _ => println!("{}", line.yellow()),
                }
            }
            Err(e) => println!("{}", format!("{:>6.2} {}", u, e).red()),
        }
    }
}
