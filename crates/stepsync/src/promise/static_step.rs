use crate::invariants::debug_assert_increasing_index;
use crate::promise::core::{PromiseCore, NO_INDEX};
use crate::promise::{PromiseConfig, WaitMode};
use std::sync::Arc;

#[cfg(feature = "debug-counters")]
use crate::promise::core::CounterSnapshot;

/// Forward-index promise with a fixed publication step.
///
/// The producer fulfils indices in strictly increasing order; consumers
/// observe progress in batches of at least `step` indices (the final indices
/// are flushed by [`StaticSetter::set_final`]). With `step == 1` every
/// fulfilment publishes.
///
/// Consumers share the promise through an `Arc`; the producer holds the
/// unique [`StaticSetter`] handle.
pub struct StaticStepPromise<T> {
    core: PromiseCore<T>,
    step: usize,
}

/// Unique producer handle of a [`StaticStepPromise`].
///
/// Owns the producer-local cursors, so the strictly-increasing-index
/// discipline is checked without any shared state.
///
/// Intentionally not `Clone`: a second setter would break the single-writer
/// protocol of the value slab.
pub struct StaticSetter<T> {
    promise: Arc<StaticStepPromise<T>>,
    /// Last index fulfilled (-1 = none). Strictly increases.
    last_set: i64,
    /// Last index published to consumers (-1 = none).
    last_published: i64,
    /// Nanoseconds spent in each `set` call, in call order.
    #[cfg(feature = "debug-counters")]
    set_latencies: Vec<u64>,
}

impl<T> StaticStepPromise<T> {
    /// Creates a promise and its unique setter.
    ///
    /// # Panics
    ///
    /// Panics if `config.step == 0`.
    pub fn create(config: PromiseConfig) -> (StaticSetter<T>, Arc<Self>) {
        assert!(config.step >= 1, "publication step must be at least 1");

        let promise = Arc::new(Self {
            core: PromiseCore::new(config.max_index, config.n_threads, config.wait_mode),
            step: config.step,
        });

        let setter = StaticSetter {
            promise: Arc::clone(&promise),
            last_set: NO_INDEX,
            last_published: NO_INDEX,
            #[cfg(feature = "debug-counters")]
            set_latencies: Vec::new(),
        };

        (setter, promise)
    }

    /// Convenience constructor; see [`StaticStepPromise::create`].
    pub fn with_capacity(
        max_index: usize,
        step: usize,
        n_threads: usize,
        wait_mode: WaitMode,
    ) -> (StaticSetter<T>, Arc<Self>) {
        Self::create(PromiseConfig::new(max_index, step, n_threads).with_wait_mode(wait_mode))
    }

    /// Waits until `index` is published and returns its value.
    ///
    /// May be called concurrently from any number of registered threads.
    /// `index` past `max_index` is a programming error (debug builds panic).
    #[inline]
    pub fn get(&self, index: usize) -> &T {
        self.core.get(index)
    }

    /// Payload-free wait; identical to [`get`](Self::get) with the value
    /// dropped. Reads naturally on `StaticStepPromise<()>`.
    #[inline]
    pub fn wait(&self, index: usize) {
        let _ = self.core.get(index);
    }

    /// The configured publication step.
    #[inline]
    pub fn step(&self) -> usize {
        self.step
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

    /// Snapshot of the weak/strong/wait counters.
    #[cfg(feature = "debug-counters")]
    pub fn counter_snapshot(&self) -> CounterSnapshot {
        self.core.counter_snapshot()
    }
}

impl<T> StaticSetter<T> {
    /// Fulfils `index` with `value`; publishes when a full step has
    /// accumulated since the last publication.
    pub fn set(&mut self, index: usize, value: T) {
        debug_assert_increasing_index!(self.last_set, index);

        #[cfg(feature = "debug-counters")]
        let started = std::time::Instant::now();

        self.promise.core.fulfil(index, value);
        self.last_set = index as i64;

        if index as i64 - self.last_published >= self.promise.step as i64 {
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
    ///
    /// Equivalent to [`set_immediate`](Self::set_immediate); marks the end of
    /// production.
    #[inline]
    pub fn set_final(&mut self, index: usize, value: T) {
        self.set_immediate(index, value);
    }

    /// The promise this setter feeds.
    #[inline]
    pub fn promise(&self) -> &Arc<StaticStepPromise<T>> {
        &self.promise
    }

    /// Nanoseconds spent in each `set` call so far, in call order.
    #[cfg(feature = "debug-counters")]
    pub fn set_latencies(&self) -> &[u64] {
        &self.set_latencies
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ThreadRegistry;

    fn register() {
        ThreadRegistry::global().register_current_thread();
    }

    #[test]
    fn test_step_two_publication_points() {
        register();
        let (mut setter, promise) =
            StaticStepPromise::<u64>::with_capacity(4, 2, 8, WaitMode::Spin);

        setter.set(0, 10);
        assert_eq!(promise.published_index(), -1);

        setter.set(1, 11);
        assert_eq!(promise.published_index(), 1);

        setter.set(2, 12);
        assert_eq!(promise.published_index(), 1);

        setter.set(3, 13);
        assert_eq!(promise.published_index(), 3);

        setter.set_final(4, 14);
        assert_eq!(promise.published_index(), 4);

        for (i, expected) in [10u64, 11, 12, 13, 14].iter().enumerate() {
            assert_eq!(promise.get(i), expected);
        }
    }

    #[test]
    fn test_step_one_publishes_every_set() {
        register();
        let (mut setter, promise) =
            StaticStepPromise::<u64>::with_capacity(3, 1, 8, WaitMode::Spin);

        for i in 0..=3u64 {
            setter.set(i as usize, i);
            assert_eq!(promise.published_index(), i as i64);
        }
    }

    #[test]
    fn test_single_index_promise() {
        register();
        let (mut setter, promise) =
            StaticStepPromise::<&'static str>::with_capacity(0, 1, 8, WaitMode::Spin);

        setter.set(0, "only");
        assert_eq!(*promise.get(0), "only");
    }

    #[test]
    fn test_repeat_get_uses_weak_cache() {
        register();
        // Generous cache so the test harness thread's registry id is covered.
        let (mut setter, promise) =
            StaticStepPromise::<u64>::with_capacity(2, 1, 512, WaitMode::Spin);

        setter.set(0, 1);
        setter.set(1, 2);

        assert_eq!(*promise.get(1), 2);
        // Second read of an already-observed index must be served by the
        // per-thread cache.
        #[cfg(feature = "debug-counters")]
        {
            let before = promise.counter_snapshot();
            assert_eq!(*promise.get(1), 2);
            let after = promise.counter_snapshot();
            assert_eq!(after.strong_gets, before.strong_gets);
            assert_eq!(after.weak_gets, before.weak_gets + 1);
        }
        #[cfg(not(feature = "debug-counters"))]
        assert_eq!(*promise.get(1), 2);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "not past previous index")]
    fn test_double_set_panics() {
        register();
        let (mut setter, _promise) =
            StaticStepPromise::<u64>::with_capacity(4, 1, 8, WaitMode::Spin);
        setter.set(1, 1);
        setter.set(1, 1);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "past maximum index")]
    fn test_get_out_of_bounds_panics() {
        register();
        let (mut setter, promise) =
            StaticStepPromise::<u64>::with_capacity(1, 1, 8, WaitMode::Spin);
        setter.set(0, 0);
        let _ = promise.get(2);
    }

    #[test]
    #[should_panic(expected = "publication step must be at least 1")]
    fn test_zero_step_rejected() {
        let _ = StaticStepPromise::<u64>::with_capacity(4, 0, 8, WaitMode::Spin);
    }
}
