use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use std::path::PathBuf;

use hfdmft::archive::Archive;
use hfdmft::lattice::BetheLattice;
use hfdmft::solver::HirschFyeSolver;
use hfdmft::{run_with_workers, DmftParams, LoopState};

/// Scan of the interaction on the half filled Bethe lattice.
#[derive(Parser, Debug)]
#[command(version, about = "Hirsch-Fye DMFT, U scan on the Bethe lattice", long_about = None)]
struct Args {
    /// Inverse temperature
    beta: f64,

    /// Interactions to visit
    #[arg(short, long, num_args = 1.., default_values_t = [1.0, 2.0, 2.5, 3.0])]
    u: Vec<f64>,

    /// Time slices
    #[arg(short = 'l', long, default_value_t = 32)]
    slices: usize,

    /// Sweeps per solve
    #[arg(short, long, default_value_t = 3000)]
    sweeps: usize,

    /// Independent Markov chains, one thread each
    #[arg(short, long, default_value_t = 1)]
    workers: usize,

    /// Maximum number of iterations per interaction
    #[arg(short, long, default_value_t = 20)]
    max_loops: usize,

    /// Archive root, one group per interaction
    #[arg(short, long, default_value = "hf_single_band")]
    output: PathBuf,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let bar = ProgressBar::new(args.u.len() as u64);
    bar.set_prefix("U scan: ");
    if let Ok(style) =
        ProgressStyle::with_template("[{elapsed_precise}] {prefix} {bar:40.cyan/blue} {pos:>3}/{len:3} {msg}")
    {
        bar.set_style(style.progress_chars("##-"));
    }

    let mut rows = Vec::with_capacity(args.u.len());
    for &u in args.u.iter() {
        let mut params = DmftParams::default();
        params.model.beta = args.beta;
        params.model.u = u;
        params.solver.n_tau = args.slices;
        params.solver.sweeps = args.sweeps;
        params.solver.therm = args.sweeps / 3;
        params.dmft.max_loops = args.max_loops;
        bar.set_message(format!("U = {}", u));
        info!("Starting U = {}", u);
        let lattice = BetheLattice { t: params.model.t };
        let outcome = Archive::open(&args.output, &format!("U{}", u), false).and_then(|archive| {
            run_with_workers(&params, lattice, args.workers, Some(archive), false, |rank| {
                HirschFyeSolver::for_rank(u, &params.solver, rank)
            })
        });
        bar.inc(1);
        rows.push((u, outcome));
    }
    bar.finish_and_clear();

    println!("{:>6} {:>12} {:>10} {:>8}", "U", "G(beta/2)", "sign", "loops");
    for (u, outcome) in rows {
        match outcome {
            Ok(outcome) => {
                let half = outcome
                    .green_tau
                    .as_ref()
                    .map(|g| g.block(0, 0)[g.n_tau / 2])
                    .unwrap_or(<f64>::NAN);
                let line = format!(
                    "{:>6.2} {:>12.6} {:>10.4} {:>8}",
                    u, half, outcome.diagnostics.mean_sign, outcome.iterations
                );
                match outcome.state {
                    LoopState::Converged => println!("{}", line.green()),
                    _ => println!("{}", line.yellow()),
                }
            }
            Err(e) => println!("{}", format!("{:>6.2} {}", u, e).red()),
        }
    }
}
