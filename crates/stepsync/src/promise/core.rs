use crate::invariants::debug_assert_index_in_bounds;
use crate::promise::WaitMode;
use crate::registry::ThreadRegistry;
use crate::Backoff;
use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Condvar, Mutex};

#[cfg(feature = "debug-counters")]
use std::sync::atomic::AtomicU64;

// =============================================================================
// MEMORY ORDERING & SYNCHRONIZATION STRATEGY
// =============================================================================
//
// The promise core is a single-writer publication protocol over a dense value
// slab:
//
// **Producer (set path):**
// 1. Write `values[index]` (no ordering needed - slot not yet published)
// 2. Store `written` with Release (consumer-driven unblock reads it)
// 3. When the step condition holds: publish `published` with Release
//    (`fetch_max` so an out-of-band unblock publication cannot be regressed)
//
// **Consumer (get path):**
// 1. Read the per-thread weak index (UnsafeCell, own slot only) - if it
//    covers the request, no atomic is touched at all
// 2. Otherwise load `published` with Acquire until it covers the request
// 3. The Acquire load synchronizes with the producer's Release publication,
//    making every `values[m]` with `m <= published` visible
// 4. Refresh the weak slot to the observed published index
//
// ## Single-Writer Invariants
//
// - `values[i]`: written once by the unique setter handle before publication,
//   read-only afterwards.
// - `weak[tid]`: written and read only by the thread registered with id
//   `tid`.
//
// Park mode takes a mutex around the publication store + notify so a waiter
// that checked the index and is about to sleep cannot miss the wake-up.
//
// =============================================================================

/// Sentinel for "nothing published yet".
pub(crate) const NO_INDEX: i64 = -1;

/// Shared body of a forward-index promise.
///
/// Holds the published index, the payload slab and the per-thread read
/// caches. The step policy lives in the wrapping promise types; the core only
/// knows how to publish and how to wait.
pub(crate) struct PromiseCore<T> {
    /// Inclusive upper bound of valid indices.
    max_index: usize,
    wait_mode: WaitMode,

    // === CONSUMER HOT ===
    /// Greatest index published to consumers (-1 = none).
    published: CachePadded<AtomicI64>,

    // === PRODUCER HOT ===
    /// Greatest index written (fulfilled) by the producer, published or not.
    /// Consumer-driven step shrinks publish up to this point.
    written: CachePadded<AtomicI64>,

    // === PARK MODE ===
    park_lock: Mutex<()>,
    park_cond: Condvar,

    // === PER-THREAD READ CACHE ===
    /// weak[tid] = last published index observed by thread `tid`. Each slot
    /// has exactly one writer (its thread), so plain cells suffice.
    weak: Box<[CachePadded<UnsafeCell<i64>>]>,

    // === PAYLOAD SLAB ===
    /// One slot per index; slot `i` is initialized iff it was fulfilled.
    values: UnsafeCell<Box<[MaybeUninit<T>]>>,

    /// Debug-only map of fulfilled slots: catches double fulfilment and
    /// reads of indices the producer skipped over.
    #[cfg(debug_assertions)]
    fulfilled: Box<[std::sync::atomic::AtomicBool]>,

    #[cfg(feature = "debug-counters")]
    counters: Counters,
}

// Safety: the publication protocol above serialises all cross-thread access.
// T: Send because payloads move in from the producer thread; T: Sync because
// consumers share references to published slots.
unsafe impl<T: Send> Send for PromiseCore<T> {}
unsafe impl<T: Send + Sync> Sync for PromiseCore<T> {}

#[cfg(feature = "debug-counters")]
#[derive(Default)]
struct Counters {
    weak_gets: AtomicU64,
    strong_gets: AtomicU64,
    wait_loops: AtomicU64,
}

/// Snapshot of the promise debug counters.
#[cfg(feature = "debug-counters")]
#[derive(Debug, Clone, Copy, Default)]
pub struct CounterSnapshot {
    /// `get` calls satisfied from the per-thread cache.
    pub weak_gets: u64,
    /// `get` calls that had to read the shared index.
    pub strong_gets: u64,
    /// Individual iterations of the wait loops.
    pub wait_loops: u64,
}

impl<T> PromiseCore<T> {
    pub(crate) fn new(max_index: usize, n_threads: usize, wait_mode: WaitMode) -> Self {
        let mut values = Vec::with_capacity(max_index + 1);
        values.resize_with(max_index + 1, MaybeUninit::uninit);

        let weak = (0..n_threads)
            .map(|_| CachePadded::new(UnsafeCell::new(NO_INDEX)))
            .collect();

        Self {
            max_index,
            wait_mode,
            published: CachePadded::new(AtomicI64::new(NO_INDEX)),
            written: CachePadded::new(AtomicI64::new(NO_INDEX)),
            park_lock: Mutex::new(()),
            park_cond: Condvar::new(),
            weak,
            values: UnsafeCell::new(values.into_boxed_slice()),
            #[cfg(debug_assertions)]
            fulfilled: (0..=max_index)
                .map(|_| std::sync::atomic::AtomicBool::new(false))
                .collect(),
            #[cfg(feature = "debug-counters")]
            counters: Counters::default(),
        }
    }

    #[inline]
    pub(crate) fn max_index(&self) -> usize {
        self.max_index
    }

    /// Greatest index currently visible to consumers, or -1.
    #[inline]
    pub(crate) fn published_index(&self) -> i64 {
        self.published.load(Ordering::Acquire)
    }

    /// Greatest index fulfilled by the producer, or -1.
    #[inline]
    pub(crate) fn written_index(&self) -> i64 {
        self.written.load(Ordering::Acquire)
    }

    // ---------------------------------------------------------------------
    // PRODUCER API (called through the unique setter handle)
    // ---------------------------------------------------------------------

    /// Writes the payload for `index` without publishing it.
    ///
    /// Caller contract (enforced by the setter handles): indices arrive in
    /// strictly increasing order from a single thread.
    pub(crate) fn fulfil(&self, index: usize, value: T) {
        debug_assert_index_in_bounds!(index, self.max_index);
        #[cfg(debug_assertions)]
        debug_assert!(
            !self.fulfilled[index].swap(true, Ordering::Relaxed),
            "index {index} fulfilled twice"
        );

        // SAFETY: slot `index` has never been written (indices are strictly
        // increasing) and is not yet published, so no consumer reads it; the
        // setter handle is unique, so no other writer exists.
        unsafe {
            (*self.values.get())[index].write(value);
        }

        self.written.store(index as i64, Ordering::Release);
    }

    /// Publishes every index up to and including `index`.
    ///
    /// Uses `fetch_max` so that a concurrent out-of-band publication (a
    /// consumer-driven step shrink) and the producer cannot regress each
    /// other.
    pub(crate) fn publish(&self, index: i64) {
        debug_assert!(
            index >= 0 && index <= self.max_index as i64,
            "publishing index {index} outside 0..={}",
            self.max_index
        );

        match self.wait_mode {
            WaitMode::Spin => {
                self.published.fetch_max(index, Ordering::AcqRel);
            }
            WaitMode::Park => {
                // The store must happen under the lock: a waiter re-checks
                // the index only after acquiring it, so it either sees the
                // new value or is registered on the condvar before notify.
                let _guard = self.park_lock.lock().unwrap();
                self.published.fetch_max(index, Ordering::AcqRel);
                self.park_cond.notify_all();
            }
        }
    }

    // ---------------------------------------------------------------------
    // CONSUMER API
    // ---------------------------------------------------------------------

    /// Waits until `index` is published and returns a reference to its value.
    pub(crate) fn get(&self, index: usize) -> &T {
        debug_assert_index_in_bounds!(index, self.max_index);

        let tid = ThreadRegistry::global().current().index();
        match self.weak.get(tid) {
            Some(padded) => {
                let slot = padded.get();

                // SAFETY: slot `tid` is written and read only by this thread.
                let cached = unsafe { *slot };

                if (index as i64) > cached {
                    #[cfg(feature = "debug-counters")]
                    self.counters.strong_gets.fetch_add(1, Ordering::Relaxed);

                    let observed = self.wait_published(index as i64);

                    // SAFETY: same single-writer slot as above.
                    unsafe {
                        *slot = observed;
                    }
                } else {
                    #[cfg(feature = "debug-counters")]
                    self.counters.weak_gets.fetch_add(1, Ordering::Relaxed);
                }
            }
            None => {
                // Thread registered after the cache was sized: fall back to
                // the shared index on every read.
                #[cfg(feature = "debug-counters")]
                self.counters.strong_gets.fetch_add(1, Ordering::Relaxed);
                let _ = self.wait_published(index as i64);
            }
        }

        #[cfg(debug_assertions)]
        debug_assert!(
            self.fulfilled[index].load(Ordering::Relaxed),
            "index {index} was published past but never fulfilled"
        );

        // SAFETY: `index <= published` was observed with Acquire (directly or
        // through the cache, which only ever holds previously observed
        // published values), so the slot is initialized and will never be
        // written again.
        unsafe { (*self.values.get())[index].assume_init_ref() }
    }

    fn wait_published(&self, index: i64) -> i64 {
        match self.wait_mode {
            WaitMode::Spin => {
                let backoff = Backoff::new();
                let mut observed = self.published.load(Ordering::Acquire);
                while observed < index {
                    #[cfg(feature = "debug-counters")]
                    self.counters.wait_loops.fetch_add(1, Ordering::Relaxed);
                    backoff.snooze();
                    observed = self.published.load(Ordering::Acquire);
                }
                observed
            }
            WaitMode::Park => {
                let mut observed = self.published.load(Ordering::Acquire);
                if observed >= index {
                    return observed;
                }
                let mut guard = self.park_lock.lock().unwrap();
                observed = self.published.load(Ordering::Acquire);
                while observed < index {
                    #[cfg(feature = "debug-counters")]
                    self.counters.wait_loops.fetch_add(1, Ordering::Relaxed);
                    guard = self.park_cond.wait(guard).unwrap();
                    observed = self.published.load(Ordering::Acquire);
                }
                observed
            }
        }
    }

    #[cfg(feature = "debug-counters")]
    pub(crate) fn counter_snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            weak_gets: self.counters.weak_gets.load(Ordering::Relaxed),
            strong_gets: self.counters.strong_gets.load(Ordering::Relaxed),
            wait_loops: self.counters.wait_loops.load(Ordering::Relaxed),
        }
    }
}

impl<T> Drop for PromiseCore<T> {
    fn drop(&mut self) {
        // Drop every fulfilled slot; `written` is the high-water mark of
        // initialized values whether or not they were published.
        let written = self.written.load(Ordering::Relaxed);
        if written >= 0 {
            let values = self.values.get_mut();
            for slot in &mut values[..=written as usize] {
                unsafe {
                    ptr::drop_in_place(slot.as_mut_ptr());
                }
            }
        }
    }
}
