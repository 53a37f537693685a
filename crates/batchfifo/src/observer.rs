use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Window sizes of the four sample streams the observer averages over.
///
/// A tuning event needs every window full, so larger windows mean slower but
/// steadier retunes.
#[derive(Debug, Clone, Copy)]
pub struct ObserverConfig {
    /// Producer work time between successive pushes.
    pub producer_window: usize,
    /// Consumer work time between successive pops.
    pub consumer_window: usize,
    /// Wall-clock cost of a producer's batched enqueue under the master lock.
    pub push_cost_window: usize,
    /// Wall-clock cost of a consumer's batched dequeue.
    pub pop_cost_window: usize,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            producer_window: 100,
            consumer_window: 100,
            push_cost_window: 100,
            pop_cost_window: 50,
        }
    }
}

/// Fixed-size sample window; refuses samples once full until reset.
struct SampleWindow {
    samples: Vec<u64>,
    capacity: usize,
}

impl SampleWindow {
    fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "sample window must hold at least one sample");
        Self {
            samples: Vec::with_capacity(capacity),
            capacity,
        }
    }

    fn record(&mut self, nanos: u64) {
        if self.samples.len() < self.capacity {
            self.samples.push(nanos);
        }
    }

    fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    fn mean(&self) -> u64 {
        let sum: u128 = self.samples.iter().map(|&s| u128::from(s)).sum();
        (sum / self.samples.len() as u128) as u64
    }

    fn reset(&mut self) {
        self.samples.clear();
    }
}

/// A view's retuning slot plus its clamp bound.
struct TunedView {
    step: Arc<AtomicUsize>,
    max_capacity: usize,
}

struct ObserverInner {
    prod_work: SampleWindow,
    cons_work: SampleWindow,
    push_cost: SampleWindow,
    pop_cost: SampleWindow,
    producers: Vec<TunedView>,
    consumers: Vec<TunedView>,
    tuning_events: u64,
}

/// Out-of-band autotuner for one ringed queue.
///
/// Views attached through `attach_observer` report four timing streams: work
/// time between pushes, work time between pops, and the wall-clock cost of
/// each batched exchange with the master. Once all four sample windows are
/// full, the observer derives new batch thresholds and release-stores them
/// into the views' step cells; views adopt them at their next batch
/// boundary. The windows then start refilling for the next tuning event.
///
/// Sample ingestion uses `try_lock`: the data path never blocks on the
/// observer, a contended sample is simply dropped.
///
/// # Cost model
///
/// With mean work times `t_p` (producer) and `t_c` (consumer) and mean batch
/// costs `cp`/`cs`, each side's threshold is set so one batched transfer is
/// amortised against the faster side's per-item work:
///
/// ```text
/// step = ceil(cost / min(t_p, t_c))      clamped to [1, max_capacity]
/// ```
///
/// The bottleneck side carries the expensive transfers, so its step grows;
/// the faster side's cheap transfers keep its step at the floor, which
/// avoids starving the queue behind a long refill batch.
pub struct Observer {
    inner: Mutex<ObserverInner>,
}

impl Observer {
    /// Creates an observer with the given window sizes.
    pub fn new(config: ObserverConfig) -> Self {
        Self {
            inner: Mutex::new(ObserverInner {
                prod_work: SampleWindow::new(config.producer_window),
                cons_work: SampleWindow::new(config.consumer_window),
                push_cost: SampleWindow::new(config.push_cost_window),
                pop_cost: SampleWindow::new(config.pop_cost_window),
                producers: Vec::new(),
                consumers: Vec::new(),
                tuning_events: 0,
            }),
        }
    }

    pub(crate) fn register_producer(&self, step: Arc<AtomicUsize>, max_capacity: usize) {
        self.inner
            .lock()
            .unwrap()
            .producers
            .push(TunedView { step, max_capacity });
    }

    pub(crate) fn register_consumer(&self, step: Arc<AtomicUsize>, max_capacity: usize) {
        self.inner
            .lock()
            .unwrap()
            .consumers
            .push(TunedView { step, max_capacity });
    }

    /// Records the work time between two successive pushes of a producer.
    pub fn record_producer_work(&self, elapsed: Duration) {
        self.record(elapsed, |inner| &mut inner.prod_work);
    }

    /// Records the work time between two successive pops of a consumer.
    pub fn record_consumer_work(&self, elapsed: Duration) {
        self.record(elapsed, |inner| &mut inner.cons_work);
    }

    /// Records the wall-clock cost of one batched enqueue.
    pub fn record_push_cost(&self, elapsed: Duration) {
        self.record(elapsed, |inner| &mut inner.push_cost);
    }

    /// Records the wall-clock cost of one batched dequeue.
    pub fn record_pop_cost(&self, elapsed: Duration) {
        self.record(elapsed, |inner| &mut inner.pop_cost);
    }

    /// Number of completed tuning events.
    pub fn tuning_events(&self) -> u64 {
        self.inner.lock().unwrap().tuning_events
    }

    fn record<F>(&self, elapsed: Duration, window: F)
    where
        F: FnOnce(&mut ObserverInner) -> &mut SampleWindow,
    {
        // Never block the data path: contended samples are dropped.
        let Ok(mut inner) = self.inner.try_lock() else {
            return;
        };

        window(&mut inner).record(elapsed.as_nanos() as u64);

        if inner.prod_work.is_full()
            && inner.cons_work.is_full()
            && inner.push_cost.is_full()
            && inner.pop_cost.is_full()
        {
            Self::tune(&mut inner);
        }
    }

    fn tune(inner: &mut ObserverInner) {
        let t_p = inner.prod_work.mean();
        let t_c = inner.cons_work.mean();
        let cp = inner.push_cost.mean();
        let cs = inner.pop_cost.mean();

        // Amortise each side's batch cost against the faster side's per-item
        // work time. Sub-resolution work samples degenerate to 1 ns so the
        // division stays meaningful.
        let min_work = t_p.min(t_c).max(1);
        let producer_step = div_ceil(cp, min_work);
        let consumer_step = div_ceil(cs, min_work);

        for view in &inner.producers {
            view.step.store(
                (producer_step as usize).clamp(1, view.max_capacity),
                Ordering::Release,
            );
        }
        for view in &inner.consumers {
            view.step.store(
                (consumer_step as usize).clamp(1, view.max_capacity),
                Ordering::Release,
            );
        }

        inner.tuning_events += 1;
        tracing::debug!(
            t_p,
            t_c,
            cp,
            cs,
            producer_step,
            consumer_step,
            "retuned queue batch thresholds"
        );

        inner.prod_work.reset();
        inner.cons_work.reset();
        inner.push_cost.reset();
        inner.pop_cost.reset();
    }
}

fn div_ceil(numerator: u64, denominator: u64) -> u64 {
    (numerator + denominator - 1) / denominator
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> ObserverConfig {
        ObserverConfig {
            producer_window: 4,
            consumer_window: 4,
            push_cost_window: 4,
            pop_cost_window: 4,
        }
    }

    fn fill(observer: &Observer, t_p: u64, t_c: u64, cp: u64, cs: u64) {
        for _ in 0..4 {
            observer.record_producer_work(Duration::from_nanos(t_p));
            observer.record_consumer_work(Duration::from_nanos(t_c));
            observer.record_push_cost(Duration::from_nanos(cp));
            observer.record_pop_cost(Duration::from_nanos(cs));
        }
    }

    #[test]
    fn test_no_tuning_until_all_windows_full() {
        let observer = Observer::new(small_config());
        for _ in 0..16 {
            observer.record_producer_work(Duration::from_nanos(100));
        }
        assert_eq!(observer.tuning_events(), 0);
    }

    #[test]
    fn test_slow_producer_grows_producer_step_only() {
        let observer = Observer::new(small_config());
        let producer_step = Arc::new(AtomicUsize::new(1));
        let consumer_step = Arc::new(AtomicUsize::new(1));
        observer.register_producer(Arc::clone(&producer_step), 1024);
        observer.register_consumer(Arc::clone(&consumer_step), 1024);

        // Producer 10x slower than the consumer; its batched enqueues are
        // expensive, the consumer's dequeues are cheap.
        fill(&observer, 10_000, 1_000, 50_000, 500);

        assert_eq!(observer.tuning_events(), 1);
        assert_eq!(producer_step.load(Ordering::Acquire), 50);
        assert_eq!(consumer_step.load(Ordering::Acquire), 1);
    }

    #[test]
    fn test_steps_clamped_to_view_capacity() {
        let observer = Observer::new(small_config());
        let producer_step = Arc::new(AtomicUsize::new(1));
        observer.register_producer(Arc::clone(&producer_step), 8);

        fill(&observer, 1_000, 1_000, 1_000_000, 1_000);

        assert_eq!(producer_step.load(Ordering::Acquire), 8);
    }

    #[test]
    fn test_windows_reset_after_tuning() {
        let observer = Observer::new(small_config());
        let producer_step = Arc::new(AtomicUsize::new(1));
        observer.register_producer(Arc::clone(&producer_step), 1024);

        fill(&observer, 1_000, 1_000, 4_000, 1_000);
        assert_eq!(observer.tuning_events(), 1);

        // The next event needs a fresh set of full windows.
        fill(&observer, 1_000, 1_000, 16_000, 1_000);
        assert_eq!(observer.tuning_events(), 2);
        assert_eq!(producer_step.load(Ordering::Acquire), 16);
    }
}
