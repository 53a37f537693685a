use crate::observer::Observer;
use crate::ringed::local::LocalRing;
use crate::ringed::master::QueueMaster;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// One-shot retune: after `after_ops` operations on the view, switch the
/// batching threshold to `new_step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconfigure {
    /// Operation count (pushes or pops) that triggers the switch.
    pub after_ops: u64,
    /// Threshold to switch to.
    pub new_step: usize,
}

/// Construction parameters for producer and consumer views.
#[derive(Debug, Clone, Copy)]
pub struct ViewConfig {
    /// Batch threshold: number of local elements exchanged with the master
    /// per transfer. Must be at least 1.
    pub step: usize,
    /// Upper bound for retuned steps; defaults to the master capacity.
    pub max_capacity: Option<usize>,
    /// Optional one-shot retune.
    pub reconfigure: Option<Reconfigure>,
}

impl ViewConfig {
    /// A view exchanging batches of `step` elements.
    pub fn with_step(step: usize) -> Self {
        Self {
            step,
            max_capacity: None,
            reconfigure: None,
        }
    }

    /// Caps retuned steps at `max_capacity`.
    pub fn with_max_capacity(mut self, max_capacity: usize) -> Self {
        self.max_capacity = Some(max_capacity);
        self
    }

    /// Adds a one-shot retune.
    pub fn with_reconfigure(mut self, reconfigure: Reconfigure) -> Self {
        self.reconfigure = Some(reconfigure);
        self
    }
}

/// Producer-side view of a [`QueueMaster`].
///
/// Elements accumulate in a local ring; when it reaches the view's `step`,
/// the whole ring is drained into the master under its lock. Step changes
/// (one-shot or observer-driven) take effect at those batch boundaries only.
pub struct ProducerView<T> {
    master: Arc<QueueMaster<T>>,
    local: LocalRing<T>,
    step: usize,
    /// Shared retuning slot: the observer release-stores, the view reads
    /// with acquire at batch boundaries.
    step_cell: Arc<AtomicUsize>,
    max_capacity: usize,
    reconfigure: Option<Reconfigure>,
    ops: u64,
    observer: Option<Arc<Observer>>,
    last_push_end: Option<Instant>,
}

impl<T> ProducerView<T> {
    pub(crate) fn new(master: Arc<QueueMaster<T>>, config: ViewConfig) -> Self {
        assert!(config.step >= 1, "view step must be at least 1");
        let max_capacity = config
            .max_capacity
            .unwrap_or_else(|| master.capacity())
            .max(config.step);
        Self {
            local: LocalRing::with_capacity(config.step),
            step: config.step,
            step_cell: Arc::new(AtomicUsize::new(config.step)),
            max_capacity,
            reconfigure: config.reconfigure,
            ops: 0,
            observer: None,
            last_push_end: None,
            master,
        }
    }

    /// Registers this view with `observer`: the observer receives this
    /// view's timing samples and may retune its step.
    pub fn attach_observer(&mut self, observer: &Arc<Observer>) {
        observer.register_producer(Arc::clone(&self.step_cell), self.max_capacity);
        self.observer = Some(Arc::clone(observer));
    }

    /// Appends `value`, draining the local ring into the master whenever a
    /// full step has accumulated. Blocks only while the master ring is full.
    pub fn push(&mut self, value: T) {
        if let Some(observer) = &self.observer {
            let now = Instant::now();
            if let Some(prev) = self.last_push_end {
                observer.record_producer_work(now - prev);
            }
        }

        self.ops += 1;
        if let Some(reconfigure) = self.reconfigure {
            if self.ops == reconfigure.after_ops {
                self.step_cell
                    .store(reconfigure.new_step.max(1), Ordering::Release);
            }
        }

        if self.local.is_full() {
            // Only reachable when a retune shrank the step below the current
            // occupancy; drain to make room.
            self.drain_local();
        }
        let pushed = self.local.push(value);
        debug_assert!(pushed.is_ok(), "local ring full after drain");

        if self.local.len() >= self.step {
            self.drain_local();
        }

        if self.observer.is_some() {
            self.last_push_end = Some(Instant::now());
        }
    }

    /// Flushes any residual local elements and signals this producer as
    /// done. Consumes the view, so a producer cannot terminate twice.
    pub fn terminate(mut self) {
        self.drain_local();
        self.master.terminate();
    }

    /// The current batch threshold.
    #[inline]
    pub fn step(&self) -> usize {
        self.step
    }

    fn drain_local(&mut self) {
        let started = self.observer.as_ref().map(|_| Instant::now());

        while !self.local.is_empty() {
            let resident = self.local.len();
            self.master.enqueue(&mut self.local, resident);
        }

        if let (Some(observer), Some(started)) = (&self.observer, started) {
            observer.record_push_cost(started.elapsed());
        }

        self.apply_step_change();
    }

    /// Adopts a pending step change; the local ring is empty here, so the
    /// resize always succeeds.
    fn apply_step_change(&mut self) {
        let target = self.step_cell.load(Ordering::Acquire).clamp(1, self.max_capacity);
        if target != self.step && self.local.resize(target).is_ok() {
            self.step = target;
        }
    }
}

/// Consumer-side view of a [`QueueMaster`].
///
/// `pop` serves from the local ring and refills it with a single batched
/// dequeue of up to `step` elements when it runs dry. `None` is end of
/// stream: the master is drained and every producer has terminated.
pub struct ConsumerView<T> {
    master: Arc<QueueMaster<T>>,
    local: LocalRing<T>,
    step: usize,
    step_cell: Arc<AtomicUsize>,
    max_capacity: usize,
    reconfigure: Option<Reconfigure>,
    ops: u64,
    observer: Option<Arc<Observer>>,
    last_pop_end: Option<Instant>,
}

impl<T> ConsumerView<T> {
    pub(crate) fn new(master: Arc<QueueMaster<T>>, config: ViewConfig) -> Self {
        assert!(config.step >= 1, "view step must be at least 1");
        let max_capacity = config
            .max_capacity
            .unwrap_or_else(|| master.capacity())
            .max(config.step);
        Self {
            local: LocalRing::with_capacity(config.step),
            step: config.step,
            step_cell: Arc::new(AtomicUsize::new(config.step)),
            max_capacity,
            reconfigure: config.reconfigure,
            ops: 0,
            observer: None,
            last_pop_end: None,
            master,
        }
    }

    /// Registers this view with `observer`.
    pub fn attach_observer(&mut self, observer: &Arc<Observer>) {
        observer.register_consumer(Arc::clone(&self.step_cell), self.max_capacity);
        self.observer = Some(Arc::clone(observer));
    }

    /// Returns the next element, or `None` at end of stream.
    pub fn pop(&mut self) -> Option<T> {
        if let Some(observer) = &self.observer {
            let now = Instant::now();
            if let Some(prev) = self.last_pop_end {
                observer.record_consumer_work(now - prev);
            }
        }

        if self.local.is_empty() {
            // Batch boundary: adopt a pending step change first (the local
            // ring is empty, so the resize always succeeds), then refill.
            self.apply_step_change();

            let started = self.observer.as_ref().map(|_| Instant::now());
            self.master.dequeue(&mut self.local, self.step)?;
            if let (Some(observer), Some(started)) = (&self.observer, started) {
                observer.record_pop_cost(started.elapsed());
            }
        }

        let value = self.local.pop();
        debug_assert!(value.is_some(), "refill returned without elements");

        self.ops += 1;
        if let Some(reconfigure) = self.reconfigure {
            if self.ops == reconfigure.after_ops {
                self.step_cell
                    .store(reconfigure.new_step.max(1), Ordering::Release);
            }
        }

        if self.observer.is_some() {
            self.last_pop_end = Some(Instant::now());
        }
        value
    }

    /// The current batch threshold.
    #[inline]
    pub fn step(&self) -> usize {
        self.step
    }

    fn apply_step_change(&mut self) {
        let target = self.step_cell.load(Ordering::Acquire).clamp(1, self.max_capacity);
        if target != self.step && self.local.resize(target).is_ok() {
            self.step = target;
        }
    }
}
