//! Neighbour links: the per-iteration channels a worker uses to stream row
//! results to its right-hand neighbour.
//!
//! Each synchronizer variant supplies the same two endpoints so the pipeline
//! driver stays agnostic of the promise flavour underneath:
//!
//! - [`NeighborTx`]: owned by the producing worker, one per boundary.
//! - [`NeighborRx`]: owned by the consuming worker.

use crate::oneshot::OneShot;
use std::sync::Arc;
use std::time::Duration;
use stepsync::{
    DynamicSetter, DynamicStepPromise, PromiseConfig, StaticSetter, StaticStepPromise, StepRule,
    WaitMode,
};

/// Producer endpoint of a neighbour link.
pub trait NeighborTx: Send {
    /// Publishes the value of `row` (subject to the link's batching).
    fn send(&mut self, row: usize, value: f64);
    /// Publishes the final row, flushing anything buffered.
    fn send_last(&mut self, row: usize, value: f64);
}

/// Consumer endpoint of a neighbour link.
pub trait NeighborRx: Send {
    /// Waits for and returns the value of `row`.
    fn recv(&mut self, row: usize) -> f64;
}

/// A scheduled mid-run `set_step` call, exercising the retune paths.
#[derive(Debug, Clone, Copy)]
pub enum RetunePlan {
    /// Nobody retunes (static promises, timer- and never-rules).
    None,
    /// The producer switches to `step` when it reaches `row`.
    Producer { row: usize, step: usize },
    /// The consumer switches to `step` when it reaches `row`.
    Consumer { row: usize, step: usize },
    /// The consumer halves the step each time it has had to wait for
    /// `threshold` rows in a row.
    Monitor { threshold: u32 },
}

/// Which channel implementation a link uses.
#[derive(Debug, Clone, Copy)]
pub enum LinkKind {
    /// Fixed-step forward-index promise.
    Static { step: usize },
    /// Dynamic-step forward-index promise.
    Dynamic {
        step: usize,
        rule: StepRule,
        plan: RetunePlan,
    },
    /// One single-use cell per row.
    OneShotArray,
    /// One single-use cell carrying the whole slab.
    OneShotVec,
}

/// Creates the two endpoints of one neighbour link for `rows` rows.
///
/// `reader_slots` sizes the per-thread read caches; pass the registry length
/// plus the number of workers about to be spawned.
pub fn make_link(
    kind: LinkKind,
    rows: usize,
    reader_slots: usize,
) -> (Box<dyn NeighborTx>, Box<dyn NeighborRx>) {
    let n_threads = reader_slots;

    match kind {
        LinkKind::Static { step } => {
            let (setter, promise) = StaticStepPromise::create(
                PromiseConfig::new(rows - 1, step, n_threads).with_wait_mode(WaitMode::Spin),
            );
            (
                Box::new(StaticTx { setter }),
                Box::new(StaticRx { promise }),
            )
        }
        LinkKind::Dynamic { step, rule, plan } => {
            let (setter, promise) = DynamicStepPromise::create(
                PromiseConfig::new(rows - 1, step, n_threads).with_wait_mode(WaitMode::Spin),
                rule,
            );
            let producer_retune = match plan {
                RetunePlan::Producer { row, step } => Some((row, step)),
                _ => None,
            };
            let consumer_retune = match plan {
                RetunePlan::Consumer { row, step } => Some((row, step)),
                _ => None,
            };
            let monitor_threshold = match plan {
                RetunePlan::Monitor { threshold } => Some(threshold),
                _ => None,
            };
            (
                Box::new(DynamicTx {
                    setter,
                    retune: producer_retune,
                }),
                Box::new(DynamicRx {
                    promise,
                    retune: consumer_retune,
                    monitor_threshold,
                    consecutive_waits: 0,
                }),
            )
        }
        LinkKind::OneShotArray => {
            let cells: Arc<Vec<OneShot<f64>>> =
                Arc::new((0..rows).map(|_| OneShot::new()).collect());
            (
                Box::new(OneShotArrayTx {
                    cells: Arc::clone(&cells),
                }),
                Box::new(OneShotArrayRx { cells }),
            )
        }
        LinkKind::OneShotVec => {
            let cell = Arc::new(OneShot::new());
            (
                Box::new(OneShotVecTx {
                    cell: Arc::clone(&cell),
                    buffer: Vec::with_capacity(rows),
                }),
                Box::new(OneShotVecRx { cell }),
            )
        }
    }
}

/// The timer budget used by the timer-driven step rules.
pub fn timer_rule(budget_us: u64, unblock: bool) -> StepRule {
    StepRule::Timer {
        budget: Duration::from_micros(budget_us),
        unblock,
    }
}

// ---------------------------------------------------------------------
// Forward-index promise links
// ---------------------------------------------------------------------

struct StaticTx {
    setter: StaticSetter<f64>,
}

#[cfg(feature = "debug-counters")]
impl Drop for StaticTx {
    fn drop(&mut self) {
        let counters = self.setter.promise().counter_snapshot();
        tracing::debug!(
            weak_gets = counters.weak_gets,
            strong_gets = counters.strong_gets,
            wait_loops = counters.wait_loops,
            set_calls = self.setter.set_latencies().len(),
            "static promise counters"
        );
    }
}

impl NeighborTx for StaticTx {
    fn send(&mut self, row: usize, value: f64) {
        self.setter.set(row, value);
    }

    fn send_last(&mut self, row: usize, value: f64) {
        self.setter.set_final(row, value);
    }
}

struct StaticRx {
    promise: Arc<StaticStepPromise<f64>>,
}

impl NeighborRx for StaticRx {
    fn recv(&mut self, row: usize) -> f64 {
        *self.promise.get(row)
    }
}

struct DynamicTx {
    setter: DynamicSetter<f64>,
    retune: Option<(usize, usize)>,
}

#[cfg(feature = "debug-counters")]
impl Drop for DynamicTx {
    fn drop(&mut self) {
        let counters = self.setter.counter_snapshot();
        tracing::debug!(
            weak_gets = counters.weak_gets,
            strong_gets = counters.strong_gets,
            wait_loops = counters.wait_loops,
            set_calls = self.setter.set_latencies().len(),
            "dynamic promise counters"
        );
    }
}

impl NeighborTx for DynamicTx {
    fn send(&mut self, row: usize, value: f64) {
        if let Some((at_row, new_step)) = self.retune {
            if row == at_row {
                self.setter.set_step(new_step);
            }
        }
        self.setter.set(row, value);
    }

    fn send_last(&mut self, row: usize, value: f64) {
        self.setter.set_final(row, value);
    }
}

struct DynamicRx {
    promise: Arc<DynamicStepPromise<f64>>,
    retune: Option<(usize, usize)>,
    monitor_threshold: Option<u32>,
    consecutive_waits: u32,
}

impl NeighborRx for DynamicRx {
    fn recv(&mut self, row: usize) -> f64 {
        if let Some((at_row, new_step)) = self.retune {
            if row == at_row {
                self.promise.set_step(new_step);
            }
        }

        if let Some(threshold) = self.monitor_threshold {
            // Monitor rule: count rows this consumer found unpublished; a
            // streak means the step buffers too much, so halve it.
            if self.promise.published_index() < row as i64 {
                self.consecutive_waits += 1;
                if self.consecutive_waits >= threshold {
                    let shrunk = (self.promise.step() / 2).max(1);
                    if shrunk < self.promise.step() {
                        self.promise.set_step(shrunk);
                    }
                    self.consecutive_waits = 0;
                }
            } else {
                self.consecutive_waits = 0;
            }
        }

        *self.promise.get(row)
    }
}

// ---------------------------------------------------------------------
// One-shot links
// ---------------------------------------------------------------------

struct OneShotArrayTx {
    cells: Arc<Vec<OneShot<f64>>>,
}

impl NeighborTx for OneShotArrayTx {
    fn send(&mut self, row: usize, value: f64) {
        self.cells[row].set(value);
    }

    fn send_last(&mut self, row: usize, value: f64) {
        self.cells[row].set(value);
    }
}

struct OneShotArrayRx {
    cells: Arc<Vec<OneShot<f64>>>,
}

impl NeighborRx for OneShotArrayRx {
    fn recv(&mut self, row: usize) -> f64 {
        *self.cells[row].get()
    }
}

struct OneShotVecTx {
    cell: Arc<OneShot<Vec<f64>>>,
    buffer: Vec<f64>,
}

impl NeighborTx for OneShotVecTx {
    fn send(&mut self, _row: usize, value: f64) {
        self.buffer.push(value);
    }

    fn send_last(&mut self, _row: usize, value: f64) {
        self.buffer.push(value);
        self.cell.set(std::mem::take(&mut self.buffer));
    }
}

struct OneShotVecRx {
    cell: Arc<OneShot<Vec<f64>>>,
}

impl NeighborRx for OneShotVecRx {
    fn recv(&mut self, row: usize) -> f64 {
        self.cell.get()[row]
    }
}
