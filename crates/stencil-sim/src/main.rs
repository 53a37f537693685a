use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use stencil_sim::config::{worker_count_from_env, Simulations};
use stencil_sim::report::{IterationRecord, Reports, RunRecord, FUNCTION_NAME};
use stencil_sim::runner::execute;
use stencil_sim::workload::Workload;
use stepsync::{ThreadRegistry, Watchdog};
use tracing_subscriber::EnvFilter;

/// Stencil pipeline benchmark driver.
#[derive(Debug, Parser)]
#[command(name = "stencil-sim", version, about)]
struct Args {
    /// Path to the simulations file that contains the data for the runs.
    simulations_file: PathBuf,

    /// File receiving the time of each run (stdout when omitted).
    #[arg(long)]
    runs_times_file: Option<PathBuf>,

    /// File receiving the per-iteration per-thread times (stdout when
    /// omitted).
    #[arg(long)]
    iterations_times_file: Option<PathBuf>,

    /// Watchdog quiescence limit, in seconds.
    #[arg(long, default_value_t = 600)]
    watchdog_limit_secs: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    // Everything that can be rejected is rejected before a worker spawns.
    let simulations = Simulations::load(&args.simulations_file)?;
    let threads = worker_count_from_env()?;
    let workload = Workload::new(threads, simulations.workload);

    ThreadRegistry::global().register_current_thread();
    let watchdog = Watchdog::new(Duration::from_secs(args.watchdog_limit_secs)).start();

    tracing::info!(
        threads,
        repetitions = simulations.iterations,
        runs = simulations.runs.len(),
        "starting simulations"
    );

    let mut reports = Reports::new();
    for run in &simulations.runs {
        let mut times = Vec::with_capacity(simulations.iterations as usize);
        let mut times_by_thread = Vec::new();

        for repetition in 0..simulations.iterations {
            let outcome = execute(run.synchronizer, run.extras, &workload, Some(&watchdog))
                .with_context(|| {
                    format!(
                        "run {} repetition {repetition}",
                        run.synchronizer.name()
                    )
                })?;

            tracing::info!(
                synchronizer = run.synchronizer.name(),
                repetition,
                seconds = outcome.seconds,
                "run finished"
            );

            times.push(outcome.seconds);
            if let Some(iteration_times) = outcome.iteration_times {
                times_by_thread.push(iteration_times);
            }
        }

        reports.add_run(RunRecord {
            synchronizer: run.synchronizer.name().to_owned(),
            function: FUNCTION_NAME.to_owned(),
            extras: run.extras,
            times,
        });
        if !times_by_thread.is_empty() {
            reports.add_iterations(IterationRecord {
                synchronizer: run.synchronizer.name().to_owned(),
                function: FUNCTION_NAME.to_owned(),
                extras: run.extras,
                times_by_thread,
            });
        }
    }

    watchdog.stop();

    reports.write_runs(args.runs_times_file.as_deref())?;
    reports.write_iterations(args.iterations_times_file.as_deref())?;

    Ok(())
}
