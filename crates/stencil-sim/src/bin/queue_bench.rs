//! Standalone producer/consumer benchmark over the two queue families.
//!
//! Runs a configurable number of producer and consumer threads against a
//! chunked smart-FIFO or a ringed master+view queue (plain, one-shot
//! reconfigured, or observer-autotuned), verifies element conservation, and
//! prints one JSON record per run.

use anyhow::{bail, Context, Result};
use batchfifo::{Observer, ObserverConfig, QueueMaster, Reconfigure, SmartFifo, ViewConfig};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::hint;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Queue benchmark driver.
#[derive(Debug, Parser)]
#[command(name = "queue-bench", version, about)]
struct Args {
    /// Path to the JSON file describing the benchmark runs.
    runs_file: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum QueueKind {
    /// Chunked smart-FIFO.
    Smart,
    /// Ringed master+view queue with fixed steps.
    Master,
    /// Ringed queue with a one-shot step reconfiguration.
    MasterReconfigure,
    /// Ringed queue autotuned by an observer.
    MasterAutotune,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
struct BenchRun {
    queue: QueueKind,
    /// Elements each producer pushes.
    items: u64,
    #[serde(default = "default_participants")]
    producers: usize,
    #[serde(default = "default_participants")]
    consumers: usize,
    /// Busy-work loop count between operations.
    #[serde(default)]
    work_spins: u64,
    /// Chunk capacity (smart) or view step (ringed).
    #[serde(default = "default_granularity")]
    granularity: usize,
    /// Master ring capacity for the ringed variants.
    #[serde(default = "default_capacity")]
    capacity: usize,
    /// One-shot retune for `master_reconfigure`.
    #[serde(default)]
    reconfigure_after: Option<u64>,
    #[serde(default)]
    reconfigure_step: Option<usize>,
}

fn default_participants() -> usize {
    1
}

fn default_granularity() -> usize {
    16
}

fn default_capacity() -> usize {
    1 << 16
}

#[derive(Debug, Serialize)]
struct BenchRecord {
    queue: QueueKind,
    producers: usize,
    consumers: usize,
    items: u64,
    seconds: f64,
    tuning_events: Option<u64>,
}

fn spin(work: u64) {
    for _ in 0..work {
        hint::spin_loop();
    }
}

fn run_smart(run: BenchRun) -> Result<f64> {
    let fifo = Arc::new(SmartFifo::<u64>::new(run.granularity));
    let started = Instant::now();

    let mut feeders = Vec::new();
    for _ in 0..run.producers {
        let producer = fifo.producer();
        let work = run.work_spins;
        let items = run.items;
        feeders.push(thread::spawn(move || {
            for i in 0..items {
                spin(work);
                producer.push(i);
            }
            producer.terminate();
        }));
    }

    let mut collectors = Vec::new();
    for _ in 0..run.consumers {
        let mut consumer = fifo.consumer(run.granularity);
        let work = run.work_spins;
        collectors.push(thread::spawn(move || {
            let mut count = 0u64;
            loop {
                let mut elements = consumer.pop();
                if elements.is_end_of_stream() {
                    break;
                }
                elements.for_each(|_| {
                    spin(work);
                    count += 1;
                });
            }
            count
        }));
    }

    for feeder in feeders {
        feeder.join().expect("producer panicked");
    }
    let popped: u64 = collectors
        .into_iter()
        .map(|c| c.join().expect("consumer panicked"))
        .sum();

    let expected = run.items * run.producers as u64;
    if popped != expected {
        bail!("smart fifo lost elements: popped {popped}, expected {expected}");
    }
    Ok(started.elapsed().as_secs_f64())
}

fn run_master(run: BenchRun) -> Result<(f64, Option<u64>)> {
    let master = Arc::new(QueueMaster::<u64>::new(run.capacity, run.producers));
    let observer = matches!(run.queue, QueueKind::MasterAutotune)
        .then(|| Arc::new(Observer::new(ObserverConfig::default())));

    let view_config = || {
        let mut config = ViewConfig::with_step(run.granularity);
        if run.queue == QueueKind::MasterReconfigure {
            config = config.with_reconfigure(Reconfigure {
                after_ops: run.reconfigure_after.unwrap_or(run.items / 2),
                new_step: run.reconfigure_step.unwrap_or(run.granularity * 2),
            });
        }
        config
    };

    let started = Instant::now();

    let mut feeders = Vec::new();
    for _ in 0..run.producers {
        let mut view = master.producer_view(view_config());
        if let Some(observer) = &observer {
            view.attach_observer(observer);
        }
        let work = run.work_spins;
        let items = run.items;
        feeders.push(thread::spawn(move || {
            for i in 0..items {
                spin(work);
                view.push(i);
            }
            view.terminate();
        }));
    }

    let mut collectors = Vec::new();
    for _ in 0..run.consumers {
        let mut view = master.consumer_view(view_config());
        if let Some(observer) = &observer {
            view.attach_observer(observer);
        }
        let work = run.work_spins;
        collectors.push(thread::spawn(move || {
            let mut count = 0u64;
            while view.pop().is_some() {
                spin(work);
                count += 1;
            }
            count
        }));
    }

    for feeder in feeders {
        feeder.join().expect("producer panicked");
    }
    let popped: u64 = collectors
        .into_iter()
        .map(|c| c.join().expect("consumer panicked"))
        .sum();

    let expected = run.items * run.producers as u64;
    if popped != expected {
        bail!("ringed queue lost elements: popped {popped}, expected {expected}");
    }

    let tuning_events = observer.map(|o| o.tuning_events());
    Ok((started.elapsed().as_secs_f64(), tuning_events))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let text = std::fs::read_to_string(&args.runs_file)
        .with_context(|| format!("cannot read {}", args.runs_file.display()))?;
    let runs: Vec<BenchRun> = serde_json::from_str(&text)
        .with_context(|| format!("malformed runs file {}", args.runs_file.display()))?;

    for run in runs {
        let record = match run.queue {
            QueueKind::Smart => {
                let seconds = run_smart(run)?;
                BenchRecord {
                    queue: run.queue,
                    producers: run.producers,
                    consumers: run.consumers,
                    items: run.items,
                    seconds,
                    tuning_events: None,
                }
            }
            _ => {
                let (seconds, tuning_events) = run_master(run)?;
                BenchRecord {
                    queue: run.queue,
                    producers: run.producers,
                    consumers: run.consumers,
                    items: run.items,
                    seconds,
                    tuning_events,
                }
            }
        };
        println!("{}", serde_json::to_string(&record)?);
    }

    Ok(())
}
