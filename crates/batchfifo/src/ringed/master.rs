use crate::invariants::{debug_assert_bounded_count, debug_assert_termination_count};
use crate::ringed::local::LocalRing;
use crate::ringed::view::{ConsumerView, ProducerView, ViewConfig};
use std::sync::{Arc, Condvar, Mutex};

struct MasterState<T> {
    ring: LocalRing<T>,
    terminated: usize,
}

/// Shared centrepiece of a ringed queue: a single bounded ring under one
/// mutex, with two condition variables for the full/empty edges.
///
/// Participants never touch the master directly; they exchange whole batches
/// through [`ProducerView`] and [`ConsumerView`] local rings, so the lock is
/// taken once per `step` elements instead of once per element.
pub struct QueueMaster<T> {
    state: Mutex<MasterState<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
    producers: usize,
}

impl<T> QueueMaster<T> {
    /// Creates a master ring of `capacity` slots fed by `producers`
    /// producer views.
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0` or `producers == 0`.
    pub fn new(capacity: usize, producers: usize) -> Self {
        assert!(capacity >= 1, "master capacity must be at least 1");
        assert!(producers >= 1, "a queue needs at least one producer");
        Self {
            state: Mutex::new(MasterState {
                ring: LocalRing::with_capacity(capacity),
                terminated: 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
            producers,
        }
    }

    /// Creates a producer view over this master.
    pub fn producer_view(self: &Arc<Self>, config: ViewConfig) -> ProducerView<T> {
        ProducerView::new(Arc::clone(self), config)
    }

    /// Creates a consumer view over this master.
    pub fn consumer_view(self: &Arc<Self>, config: ViewConfig) -> ConsumerView<T> {
        ConsumerView::new(Arc::clone(self), config)
    }

    /// The bounded capacity of the central ring.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of elements currently resident in the central ring.
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().ring.len()
    }

    /// True when the central ring is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Moves up to `limit` elements from `local` into the master ring,
    /// waiting on `not_full` while the master is full.
    ///
    /// Returns the number of elements moved (at least 1 when `local` is
    /// non-empty and `limit > 0`).
    pub(crate) fn enqueue(&self, local: &mut LocalRing<T>, limit: usize) -> usize {
        let mut state = self.state.lock().unwrap();
        while state.ring.is_full() {
            state = self.not_full.wait(state).unwrap();
        }

        let mut moved = 0;
        while moved < limit && !state.ring.is_full() {
            match local.pop() {
                Some(value) => {
                    // Cannot fail: fullness was just checked under the lock.
                    let _ = state.ring.push(value);
                    moved += 1;
                }
                None => break,
            }
        }
        debug_assert_bounded_count!(state.ring.len(), self.capacity);

        if moved > 0 {
            self.not_empty.notify_all();
        }
        moved
    }

    /// Moves up to `limit` elements from the master ring into `local`,
    /// waiting on `not_empty` while the master is empty and producers
    /// remain.
    ///
    /// Returns `None` exactly when the master is empty and every producer
    /// has terminated (end of stream), `Some(moved)` otherwise.
    pub(crate) fn dequeue(&self, local: &mut LocalRing<T>, limit: usize) -> Option<usize> {
        let mut state = self.state.lock().unwrap();
        while state.ring.is_empty() && state.terminated < self.producers {
            state = self.not_empty.wait(state).unwrap();
        }

        if state.ring.is_empty() {
            return None;
        }

        let mut moved = 0;
        while moved < limit && !local.is_full() {
            match state.ring.pop() {
                Some(value) => {
                    let _ = local.push(value);
                    moved += 1;
                }
                None => break,
            }
        }

        if moved > 0 {
            self.not_full.notify_all();
        }
        Some(moved)
    }

    /// Records one producer as done; wakes all consumers once the last
    /// producer terminates so they can observe end of stream.
    pub(crate) fn terminate(&self) {
        let mut state = self.state.lock().unwrap();
        state.terminated += 1;
        debug_assert_termination_count!(state.terminated, self.producers);

        if state.terminated >= self.producers {
            self.not_empty.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_dequeue_roundtrip() {
        let master = QueueMaster::new(8, 1);
        let mut out = LocalRing::with_capacity(8);
        let mut incoming = LocalRing::with_capacity(8);

        for i in 0..5 {
            incoming.push(i).unwrap();
        }

        assert_eq!(master.enqueue(&mut incoming, 8), 5);
        assert!(incoming.is_empty());
        assert_eq!(master.len(), 5);

        assert_eq!(master.dequeue(&mut out, 8), Some(5));
        for i in 0..5 {
            assert_eq!(out.pop(), Some(i));
        }
    }

    #[test]
    fn test_enqueue_respects_master_capacity() {
        let master = QueueMaster::new(4, 1);
        let mut incoming = LocalRing::with_capacity(8);
        for i in 0..6 {
            incoming.push(i).unwrap();
        }

        // Only 4 fit; the remainder stays in the local ring.
        assert_eq!(master.enqueue(&mut incoming, 8), 4);
        assert_eq!(incoming.len(), 2);
        assert_eq!(master.len(), 4);
    }

    #[test]
    fn test_dequeue_end_of_stream_after_termination() {
        let master = QueueMaster::<u64>::new(4, 2);
        let mut out = LocalRing::with_capacity(4);

        master.terminate();
        // One producer still running: dequeue would block, so terminate the
        // other first.
        master.terminate();

        assert_eq!(master.dequeue(&mut out, 4), None);
    }

    #[test]
    fn test_dequeue_drains_before_end_of_stream() {
        let master = QueueMaster::new(4, 1);
        let mut incoming = LocalRing::with_capacity(4);
        incoming.push(42).unwrap();
        master.enqueue(&mut incoming, 4);
        master.terminate();

        let mut out = LocalRing::with_capacity(4);
        assert_eq!(master.dequeue(&mut out, 4), Some(1));
        assert_eq!(out.pop(), Some(42));
        assert_eq!(master.dequeue(&mut out, 4), None);
    }
}
