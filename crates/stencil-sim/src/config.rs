use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Environment variable naming the worker count, read once at startup.
pub const NUM_THREADS_ENV: &str = "STENCIL_NUM_THREADS";

/// Errors detected before any worker spawns.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read simulations file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed simulations file {path}: {source}")]
    Malformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("simulations file declares {0} repetitions; at least 1 is required")]
    NoIterations(u32),
    #[error("simulations file declares no runs")]
    NoRuns,
    #[error("run {index}: step must be at least 1")]
    ZeroStep { index: usize },
    #[error("{NUM_THREADS_ENV} is not set; the worker count is mandatory")]
    MissingThreadCount,
    #[error("{NUM_THREADS_ENV}={value:?} is not a thread count")]
    BadThreadCount { value: String },
}

/// Which synchronizer a run exercises. The names are the on-disk strings of
/// the simulations file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynchronizerKind {
    Sequential,
    AltBit,
    Counter,
    StaticStepPlus,
    ArrayOfPromises,
    PromiseOfArray,
    DspProdOnly,
    DspConsOnly,
    DspBoth,
    DspProdUnblocks,
    DspConsUnblocks,
    DspBothUnblocks,
    DspProdTimer,
    DspProdTimerUnblocks,
    DspMonitor,
    DspNever,
}

impl SynchronizerKind {
    /// The on-disk name, also used in result records.
    pub fn name(self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::AltBit => "alt_bit",
            Self::Counter => "counter",
            Self::StaticStepPlus => "static_step_plus",
            Self::ArrayOfPromises => "array_of_promises",
            Self::PromiseOfArray => "promise_of_array",
            Self::DspProdOnly => "dsp_prod_only",
            Self::DspConsOnly => "dsp_cons_only",
            Self::DspBoth => "dsp_both",
            Self::DspProdUnblocks => "dsp_prod_unblocks",
            Self::DspConsUnblocks => "dsp_cons_unblocks",
            Self::DspBothUnblocks => "dsp_both_unblocks",
            Self::DspProdTimer => "dsp_prod_timer",
            Self::DspProdTimerUnblocks => "dsp_prod_timer_unblocks",
            Self::DspMonitor => "dsp_monitor",
            Self::DspNever => "dsp_never",
        }
    }

    /// True for the variants that report per-thread iteration times.
    pub fn is_promise_family(self) -> bool {
        !matches!(self, Self::Sequential | Self::AltBit | Self::Counter)
    }
}

/// Per-run tuning knobs. Unknown keys are rejected so typos surface as
/// configuration errors rather than silently running defaults.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Extras {
    /// Initial publication step of the promise under test.
    pub step: u64,
    /// Budget (microseconds) of the timer-driven step rules.
    pub timer_budget_us: u64,
    /// Row at which a manual retune fires; defaults to the middle row.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retune_row: Option<usize>,
    /// Step adopted by the manual retune; defaults to half the initial step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retune_step: Option<u64>,
}

impl Default for Extras {
    fn default() -> Self {
        Self {
            step: 1,
            timer_budget_us: 50,
            retune_row: None,
            retune_step: None,
        }
    }
}

/// Shape of the synthetic stencil every run executes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct WorkloadConfig {
    /// Outer stencil iterations per run.
    pub iterations: usize,
    /// Rows per worker slab (one promise index per row).
    pub rows: usize,
    /// Busy-work loop count per row.
    pub spin: u64,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            iterations: 10,
            rows: 64,
            spin: 500,
        }
    }
}

/// One entry of the `runs` array.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunSpec {
    pub synchronizer: SynchronizerKind,
    #[serde(default)]
    pub extras: Extras,
}

/// The parsed simulations file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Simulations {
    /// How many times each run is repeated (outer repetitions).
    pub iterations: u32,
    pub runs: Vec<RunSpec>,
    #[serde(default)]
    pub workload: WorkloadConfig,
}

impl Simulations {
    /// Loads and validates a simulations file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let simulations: Simulations =
            serde_json::from_str(&text).map_err(|source| ConfigError::Malformed {
                path: path.display().to_string(),
                source,
            })?;
        simulations.validate()?;
        Ok(simulations)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.iterations == 0 {
            return Err(ConfigError::NoIterations(self.iterations));
        }
        if self.runs.is_empty() {
            return Err(ConfigError::NoRuns);
        }
        for (index, run) in self.runs.iter().enumerate() {
            if run.extras.step == 0 {
                return Err(ConfigError::ZeroStep { index });
            }
        }
        Ok(())
    }
}

/// Reads the mandatory worker count from the environment.
pub fn worker_count_from_env() -> Result<usize, ConfigError> {
    let value = std::env::var(NUM_THREADS_ENV).map_err(|_| ConfigError::MissingThreadCount)?;
    match value.parse::<usize>() {
        Ok(count) if count >= 1 => Ok(count),
        _ => Err(ConfigError::BadThreadCount { value }),
    }
}
