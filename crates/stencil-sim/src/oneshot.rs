use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicBool, Ordering};
use stepsync::Backoff;

/// Single-use rendezvous cell: one `set`, any number of `get`s.
///
/// The building block of the array-of-promises and promise-of-array
/// harnesses, where every row (or every slab) gets its own binary
/// fulfilment instead of a shared monotone index.
pub struct OneShot<T> {
    ready: AtomicBool,
    value: UnsafeCell<MaybeUninit<T>>,
}

// Safety: `value` is written once before the release store on `ready` and
// read only after an acquire load observes it.
unsafe impl<T: Send> Send for OneShot<T> {}
unsafe impl<T: Send + Sync> Sync for OneShot<T> {}

impl<T> OneShot<T> {
    pub fn new() -> Self {
        Self {
            ready: AtomicBool::new(false),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// Fulfils the cell. Setting twice is a programming error (debug builds
    /// panic).
    pub fn set(&self, value: T) {
        debug_assert!(
            !self.ready.load(Ordering::Relaxed),
            "one-shot cell fulfilled twice"
        );
        // SAFETY: single setter by contract; no reader touches the slot
        // before the release store below.
        unsafe {
            (*self.value.get()).write(value);
        }
        self.ready.store(true, Ordering::Release);
    }

    /// Spins until the cell is fulfilled, then returns its value.
    pub fn get(&self) -> &T {
        let backoff = Backoff::new();
        while !self.ready.load(Ordering::Acquire) {
            backoff.snooze();
        }
        // SAFETY: the acquire load synchronizes with `set`'s release store,
        // so the slot is initialized and never written again.
        unsafe { (*self.value.get()).assume_init_ref() }
    }
}

impl<T> Default for OneShot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for OneShot<T> {
    fn drop(&mut self) {
        if *self.ready.get_mut() {
            unsafe {
                (*self.value.get()).assume_init_drop();
            }
        }
    }
}
