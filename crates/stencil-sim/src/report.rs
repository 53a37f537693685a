//! Result records and their JSON writers.
//!
//! Two outputs mirror the two CLI paths: per-run total times, and the
//! per-iteration per-thread breakdown the promise family additionally
//! records. Each goes to its file when one was given, to stdout otherwise.

use crate::config::Extras;
use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// Name of the kernel under test, reported alongside every record.
pub const FUNCTION_NAME: &str = "stencil";

/// One run's total wall times across repetitions.
#[derive(Debug, Serialize)]
pub struct RunRecord {
    pub synchronizer: String,
    pub function: String,
    pub extras: Extras,
    /// Seconds per repetition.
    pub times: Vec<f64>,
}

/// One promise-family run's per-thread iteration times.
#[derive(Debug, Serialize)]
pub struct IterationRecord {
    pub synchronizer: String,
    pub function: String,
    pub extras: Extras,
    /// `[repetition][iteration][thread]` seconds.
    pub times_by_thread: Vec<Vec<Vec<f64>>>,
}

/// Accumulates records over the whole simulation and writes them at the end.
#[derive(Default)]
pub struct Reports {
    runs: Vec<RunRecord>,
    iterations: Vec<IterationRecord>,
}

impl Reports {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_run(&mut self, record: RunRecord) {
        self.runs.push(record);
    }

    pub fn add_iterations(&mut self, record: IterationRecord) {
        self.iterations.push(record);
    }

    /// Writes the per-run times as JSON.
    pub fn write_runs(&self, path: Option<&Path>) -> Result<()> {
        write_json(&self.runs, path).context("writing runs times")
    }

    /// Writes the per-iteration breakdown as JSON. Nothing is written when
    /// no promise-family run was executed.
    pub fn write_iterations(&self, path: Option<&Path>) -> Result<()> {
        if self.iterations.is_empty() {
            return Ok(());
        }
        write_json(&self.iterations, path).context("writing iteration times")
    }
}

fn write_json<T: Serialize>(records: &T, path: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(records)?;
    match path {
        Some(path) => {
            let mut file = std::fs::File::create(path)
                .with_context(|| format!("creating {}", path.display()))?;
            writeln!(file, "{json}")?;
        }
        None => {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            writeln!(out, "{json}")?;
        }
    }
    Ok(())
}
