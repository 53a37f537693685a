//! Forward-index promises.
//!
//! A promise is a monotone progress counter shared between exactly one
//! producer and any number of consumers, optionally carrying one payload per
//! index. The producer fulfils indices `0..=max_index` in strictly increasing
//! order; consumers wait until the published index covers what they need.
//!
//! Publication is decoupled from fulfilment: the producer buffers progress
//! and only release-stores the shared index every `step` fulfilments, so
//! consumers pay one acquire load per *batch* of indices instead of one per
//! index. A per-thread read cache (the weak index) removes even that load on
//! repeat reads.

mod core;
mod dynamic_step;
mod static_step;

pub use dynamic_step::{DynamicSetter, DynamicStepPromise, StepRule};
pub use static_step::{StaticSetter, StaticStepPromise};

#[cfg(feature = "debug-counters")]
pub use self::core::CounterSnapshot;

/// How a consumer waits for an index that is not yet published.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitMode {
    /// Spin on the published index with acquire loads (adaptive backoff).
    Spin,
    /// Block on a condition variable; the producer notifies on publication.
    Park,
}

/// Construction parameters shared by the promise flavours.
#[derive(Debug, Clone, Copy)]
pub struct PromiseConfig {
    /// Inclusive upper bound of valid indices.
    pub max_index: usize,
    /// Initial publication step. Must be at least 1.
    pub step: usize,
    /// Number of consumer threads that may call `get` (sizes the per-thread
    /// read cache; threads are identified by their registry id).
    pub n_threads: usize,
    /// Wait strategy for consumers.
    pub wait_mode: WaitMode,
}

impl PromiseConfig {
    /// Creates a configuration with the default `Spin` wait mode.
    pub fn new(max_index: usize, step: usize, n_threads: usize) -> Self {
        Self {
            max_index,
            step,
            n_threads,
            wait_mode: WaitMode::Spin,
        }
    }

    /// Sets the wait mode.
    pub fn with_wait_mode(mut self, wait_mode: WaitMode) -> Self {
        self.wait_mode = wait_mode;
        self
    }
}
