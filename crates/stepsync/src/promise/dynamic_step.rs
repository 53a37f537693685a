use crate::invariants::debug_assert_increasing_index;
use crate::promise::core::{PromiseCore, NO_INDEX};
use crate::promise::{PromiseConfig, WaitMode};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[cfg(feature = "debug-counters")]
use crate::promise::core::CounterSnapshot;

/// Number of `set` inter-arrival samples the timer rule averages over.
const TIMER_WINDOW: usize = 16;

/// Who may retune the publication step of a [`DynamicStepPromise`], and
/// whether a shrink immediately unblocks waiting consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepRule {
    /// Only the producer calls `set_step` (through its setter handle).
    ProducerOnly {
        /// On a step decrease, publish the last fulfilled index right away so
        /// consumers blocked on already-written values wake up.
        unblock: bool,
    },
    /// Only consumers call `set_step`; concurrent callers serialise on an
    /// internal lock.
    ConsumerOnly { unblock: bool },
    /// Either side may call `set_step`; all callers serialise on the lock.
    Both { unblock: bool },
    /// The step is autotuned by the producer: when the rolling mean of `set`
    /// inter-arrival times exceeds `budget`, the step halves (min 1).
    /// External `set_step` calls are a programming error.
    Timer {
        /// Per-`set` latency budget driving the autotune.
        budget: Duration,
        /// Publish buffered progress whenever the autotune shrinks the step.
        unblock: bool,
    },
    /// The step never changes; `set_step` is a programming error. This is the
    /// frozen interpretation of the otherwise-unused "never" mode.
    Never,
}

impl StepRule {
    fn producer_may_retune(self) -> bool {
        matches!(self, StepRule::ProducerOnly { .. } | StepRule::Both { .. })
    }

    fn consumer_may_retune(self) -> bool {
        matches!(self, StepRule::ConsumerOnly { .. } | StepRule::Both { .. })
    }

    fn unblocks(self) -> bool {
        matches!(
            self,
            StepRule::ProducerOnly { unblock: true }
                | StepRule::ConsumerOnly { unblock: true }
                | StepRule::Both { unblock: true }
                | StepRule::Timer { unblock: true, .. }
        )
    }

    fn needs_lock(self) -> bool {
        matches!(self, StepRule::ConsumerOnly { .. } | StepRule::Both { .. })
    }
}

/// Forward-index promise whose publication step can change at runtime.
///
/// Identical consumer surface to the static flavour, plus [`set_step`]
/// (consumer side) and [`DynamicSetter::set_step`] (producer side) governed
/// by the promise's [`StepRule`].
///
/// A shrink in an "unblock" rule retroactively publishes the indices the old,
/// larger step was still buffering, so no consumer stays blocked on progress
/// the producer has already made.
///
/// [`set_step`]: Self::set_step
pub struct DynamicStepPromise<T> {
    core: PromiseCore<T>,
    rule: StepRule,
    /// Current publication step. Read with acquire wherever a publication
    /// decision is taken; written with release (or under `step_lock`).
    step: AtomicUsize,
    /// Serialises consumer-side (and `Both`) step changes.
    step_lock: Mutex<()>,
}

/// Unique producer handle of a [`DynamicStepPromise`].
pub struct DynamicSetter<T> {
    promise: Arc<DynamicStepPromise<T>>,
    /// Last index fulfilled (-1 = none). Strictly increases.
    last_set: i64,
    /// Publication baseline: a full initial step of fulfilments buffers
    /// before the first publication.
    last_published: i64,
    /// Timer-rule state: previous `set` timestamp and the interval window.
    last_set_at: Option<Instant>,
    intervals: Vec<Duration>,
    /// Nanoseconds spent in each `set` call, in call order.
    #[cfg(feature = "debug-counters")]
    set_latencies: Vec<u64>,
}

impl<T> DynamicStepPromise<T> {
    /// Creates a promise governed by `rule` and its unique setter.
    ///
    /// # Panics
    ///
    /// Panics if `config.step == 0`.
    pub fn create(config: PromiseConfig, rule: StepRule) -> (DynamicSetter<T>, Arc<Self>) {
        assert!(config.step >= 1, "publication step must be at least 1");

        let promise = Arc::new(Self {
            core: PromiseCore::new(config.max_index, config.n_threads, config.wait_mode),
            rule,
            step: AtomicUsize::new(config.step),
            step_lock: Mutex::new(()),
        });

        let setter = DynamicSetter {
            promise: Arc::clone(&promise),
            last_set: NO_INDEX,
            last_published: 0,
            last_set_at: None,
            intervals: Vec::with_capacity(TIMER_WINDOW),
            #[cfg(feature = "debug-counters")]
            set_latencies: Vec::new(),
        };

        (setter, promise)
    }

    /// Convenience constructor; see [`DynamicStepPromise::create`].
    pub fn with_capacity(
        max_index: usize,
        step: usize,
        n_threads: usize,
        wait_mode: WaitMode,
        rule: StepRule,
    ) -> (DynamicSetter<T>, Arc<Self>) {
        Self::create(
            PromiseConfig::new(max_index, step, n_threads).with_wait_mode(wait_mode),
            rule,
        )
    }

    /// Waits until `index` is published and returns its value.
    #[inline]
    pub fn get(&self, index: usize) -> &T {
        self.core.get(index)
    }

    /// Payload-free wait.
    #[inline]
    pub fn wait(&self, index: usize) {
        let _ = self.core.get(index);
    }

    /// Current publication step.
    #[inline]
    pub fn step(&self) -> usize {
        self.step.load(Ordering::Acquire)
    }

    /// The retuning rule this promise was created with.
    #[inline]
    pub fn rule(&self) -> StepRule {
        self.rule
    }

    /// Inclusive upper bound of valid indices.
    #[inline]
    pub fn max_index(&self) -> usize {
        self.core.max_index()
    }

    /// Greatest index currently visible to consumers, or -1.
    #[inline]
    pub fn published_index(&self) -> i64 {
        self.core.published_index()
    }

    /// Consumer-side step change.
    ///
    /// Only valid under the `ConsumerOnly` and `Both` rules (debug builds
    /// panic otherwise; release builds ignore the call). With an "unblock"
    /// rule, a decrease publishes everything the producer has fulfilled so
    /// far.
    pub fn set_step(&self, new_step: usize) {
        assert!(new_step >= 1, "publication step must be at least 1");
        debug_assert!(
            self.rule.consumer_may_retune(),
            "consumer-side set_step under rule {:?}",
            self.rule
        );
        if !self.rule.consumer_may_retune() {
            return;
        }

        let _guard = self.step_lock.lock().unwrap();
        let old = self.step.load(Ordering::Acquire);
        self.step.store(new_step, Ordering::Release);

        if self.rule.unblocks() && new_step < old {
            let written = self.core.written_index();
            if written >= 0 {
                self.core.publish(written);
            }
        }
    }
}

impl<T> DynamicSetter<T> {
    /// Fulfils `index` with `value`; publishes when a full step has
    /// accumulated since the last publication.
    pub fn set(&mut self, index: usize, value: T) {
        debug_assert_increasing_index!(self.last_set, index);

        if let StepRule::Timer { budget, unblock } = self.promise.rule {
            self.record_set_interval(budget, unblock);
        }

        #[cfg(feature = "debug-counters")]
        let started = Instant::now();

        self.promise.core.fulfil(index, value);
        self.last_set = index as i64;

        let step = self.promise.step.load(Ordering::Acquire);
        if index as i64 - self.last_published >= step as i64 {
            self.promise.core.publish(index as i64);
            self.last_published = index as i64;
        }

        #[cfg(feature = "debug-counters")]
        self.set_latencies.push(started.elapsed().as_nanos() as u64);
    }

    /// Fulfils `index` and publishes unconditionally.
    pub fn set_immediate(&mut self, index: usize, value: T) {
        debug_assert_increasing_index!(self.last_set, index);

        self.promise.core.fulfil(index, value);
        self.last_set = index as i64;
        self.promise.core.publish(index as i64);
        self.last_published = index as i64;
    }

    /// Fulfils the last index of the stream and publishes it.
    #[inline]
    pub fn set_final(&mut self, index: usize, value: T) {
        self.set_immediate(index, value);
    }

    /// Producer-side step change.
    ///
    /// Only valid under the `ProducerOnly` and `Both` rules (debug builds
    /// panic otherwise; release builds ignore the call). Takes effect on the
    /// next `set`; with an "unblock" rule, a decrease publishes the last
    /// fulfilled index immediately.
    pub fn set_step(&mut self, new_step: usize) {
        assert!(new_step >= 1, "publication step must be at least 1");
        debug_assert!(
            self.promise.rule.producer_may_retune(),
            "producer-side set_step under rule {:?}",
            self.promise.rule
        );
        if !self.promise.rule.producer_may_retune() {
            return;
        }

        // The `Both` rule races with consumer-side callers; serialise on the
        // same lock they use.
        let _guard = self
            .promise
            .rule
            .needs_lock()
            .then(|| self.promise.step_lock.lock().unwrap());

        let old = self.promise.step.load(Ordering::Acquire);
        self.promise.step.store(new_step, Ordering::Release);

        if self.promise.rule.unblocks() && new_step < old && self.last_set >= 0 {
            self.promise.core.publish(self.last_set);
            self.last_published = self.last_set;
        }
    }

    /// The promise this setter feeds.
    #[inline]
    pub fn promise(&self) -> &Arc<DynamicStepPromise<T>> {
        &self.promise
    }

    /// Snapshot of the weak/strong/wait counters.
    #[cfg(feature = "debug-counters")]
    pub fn counter_snapshot(&self) -> CounterSnapshot {
        self.promise.core.counter_snapshot()
    }

    /// Nanoseconds spent in each `set` call so far, in call order.
    #[cfg(feature = "debug-counters")]
    pub fn set_latencies(&self) -> &[u64] {
        &self.set_latencies
    }

    fn record_set_interval(&mut self, budget: Duration, unblock: bool) {
        let now = Instant::now();
        if let Some(prev) = self.last_set_at {
            self.intervals.push(now - prev);
            if self.intervals.len() == TIMER_WINDOW {
                let total: Duration = self.intervals.iter().sum();
                let mean = total / TIMER_WINDOW as u32;
                if mean > budget {
                    let step = self.promise.step.load(Ordering::Acquire);
                    let shrunk = (step / 2).max(1);
                    self.promise.step.store(shrunk, Ordering::Release);

                    if unblock && shrunk < step && self.last_set >= 0 {
                        self.promise.core.publish(self.last_set);
                        self.last_published = self.last_set;
                    }
                }
                self.intervals.clear();
            }
        }
        self.last_set_at = Some(now);
    }
}
