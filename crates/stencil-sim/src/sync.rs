//! Iteration-granular neighbour ordering protocols: the pre-promise
//! synchronizers the promise family is benchmarked against.

use crate::driver::NeighborBarrier;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use stepsync::Backoff;

/// Alternating-bit handshake: one boolean flag per boundary.
///
/// Worker `t` consumes its left neighbour's flag before an iteration and
/// raises its own after; raising waits for the previous signal to have been
/// consumed, so a fast worker can run at most one iteration ahead of its
/// right-hand neighbour.
pub struct AltBitSync {
    flags: Vec<AtomicBool>,
    threads: usize,
}

impl AltBitSync {
    pub fn new(threads: usize) -> Self {
        Self {
            flags: (0..threads).map(|_| AtomicBool::new(false)).collect(),
            threads,
        }
    }
}

impl NeighborBarrier for AltBitSync {
    fn wait_left(&self, t: usize, _iteration: usize) {
        if t == 0 {
            return;
        }
        let flag = &self.flags[t - 1];
        let backoff = Backoff::new();
        while !flag.load(Ordering::Acquire) {
            backoff.snooze();
        }
        flag.store(false, Ordering::Release);
    }

    fn signal_right(&self, t: usize, _iteration: usize) {
        if t + 1 >= self.threads {
            return;
        }
        let flag = &self.flags[t];
        let backoff = Backoff::new();
        while flag.load(Ordering::Acquire) {
            backoff.snooze();
        }
        flag.store(true, Ordering::Release);
    }
}

/// Monotone-counter handshake: one completed-iteration counter per worker.
///
/// Unlike the alternating bit there is no consumption step, so a worker
/// never waits for its right-hand neighbour; the counters simply expose how
/// far each worker has progressed.
pub struct CounterSync {
    completed: Vec<AtomicUsize>,
    threads: usize,
}

impl CounterSync {
    pub fn new(threads: usize) -> Self {
        Self {
            completed: (0..threads).map(|_| AtomicUsize::new(0)).collect(),
            threads,
        }
    }
}

impl NeighborBarrier for CounterSync {
    fn wait_left(&self, t: usize, iteration: usize) {
        if t == 0 {
            return;
        }
        let counter = &self.completed[t - 1];
        let backoff = Backoff::new();
        while counter.load(Ordering::Acquire) < iteration + 1 {
            backoff.snooze();
        }
    }

    fn signal_right(&self, t: usize, iteration: usize) {
        if t + 1 >= self.threads {
            return;
        }
        self.completed[t].store(iteration + 1, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkloadConfig;
    use crate::driver::run_plane_synced;
    use crate::workload::Workload;

    fn workload(threads: usize) -> Workload {
        Workload::new(
            threads,
            WorkloadConfig {
                iterations: 6,
                rows: 12,
                spin: 50,
            },
        )
    }

    #[test]
    fn test_alt_bit_matches_reference() {
        let w = workload(4);
        let sync = AltBitSync::new(4);
        let run = run_plane_synced(&w, &sync, None);
        assert_eq!(run.slabs, w.reference());
    }

    #[test]
    fn test_counter_matches_reference() {
        let w = workload(4);
        let sync = CounterSync::new(4);
        let run = run_plane_synced(&w, &sync, None);
        assert_eq!(run.slabs, w.reference());
    }

    #[test]
    fn test_single_worker_needs_no_signalling() {
        let w = workload(1);
        let sync = AltBitSync::new(1);
        let run = run_plane_synced(&w, &sync, None);
        assert_eq!(run.slabs, w.reference());
    }
}
