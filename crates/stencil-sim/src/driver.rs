//! Pipeline drivers: schedule `threads x iterations` of the synthetic
//! stencil over a worker pool, wiring neighbour dependencies either through
//! per-iteration links (the promise family) or through a shared plane store
//! guarded by a lightweight barrier protocol (alt-bit, counter).

use crate::links::{make_link, LinkKind, NeighborRx, NeighborTx};
use crate::workload::Workload;
use std::cell::UnsafeCell;
use std::sync::Barrier;
use std::thread;
use std::time::{Duration, Instant};
use stepsync::{ThreadRegistry, WatchdogHandle};

/// Result of one full run: wall time, per-(iteration, thread) seconds, and
/// the final slab of every worker for verification.
pub struct PipelineRun {
    pub elapsed: Duration,
    /// `iteration_times[i][t]` = seconds worker `t` spent in iteration `i`.
    pub iteration_times: Vec<Vec<f64>>,
    pub slabs: Vec<Vec<f64>>,
}

/// Runs the promise-family pipeline: every iteration gets fresh neighbour
/// links, created before the workers start and dropped by the workers as
/// soon as the iteration's kernel returns.
pub fn run_linked(
    workload: &Workload,
    kind: LinkKind,
    watchdog: Option<&WatchdogHandle>,
) -> PipelineRun {
    let threads = workload.threads;
    let reader_slots = ThreadRegistry::global().len() + threads + 1;

    // tx_table[t][i] / rx_table[t][i]: worker t's endpoints for iteration i.
    // Worker t feeds the link read by t+1; boundary workers keep `None`.
    let mut tx_table: Vec<Vec<Option<Box<dyn NeighborTx>>>> = (0..threads)
        .map(|_| (0..workload.iterations).map(|_| None).collect())
        .collect();
    let mut rx_table: Vec<Vec<Option<Box<dyn NeighborRx>>>> = (0..threads)
        .map(|_| (0..workload.iterations).map(|_| None).collect())
        .collect();

    for i in 0..workload.iterations {
        for t in 0..threads.saturating_sub(1) {
            let (tx, rx) = make_link(kind, workload.rows, reader_slots);
            tx_table[t][i] = Some(tx);
            rx_table[t + 1][i] = Some(rx);
        }
    }

    let barrier = Barrier::new(threads);
    let started = Instant::now();

    let mut outcomes: Vec<(Vec<f64>, Vec<f64>)> = Vec::with_capacity(threads);
    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(threads);
        for (t, (tx_slots, rx_slots)) in tx_table
            .drain(..)
            .zip(rx_table.drain(..))
            .enumerate()
        {
            let barrier = &barrier;
            let watchdog = watchdog.cloned();
            handles.push(scope.spawn(move || {
                ThreadRegistry::global().register_current_thread();
                barrier.wait();
                worker_loop(workload, t, tx_slots, rx_slots, watchdog.as_ref())
            }));
        }
        for handle in handles {
            outcomes.push(handle.join().expect("worker panicked"));
        }
    });

    let elapsed = started.elapsed();
    let mut iteration_times = vec![vec![0.0; threads]; workload.iterations];
    let mut slabs = Vec::with_capacity(threads);
    for (t, (times, slab)) in outcomes.into_iter().enumerate() {
        for (i, seconds) in times.into_iter().enumerate() {
            iteration_times[i][t] = seconds;
        }
        slabs.push(slab);
    }

    PipelineRun {
        elapsed,
        iteration_times,
        slabs,
    }
}

fn worker_loop(
    workload: &Workload,
    t: usize,
    mut tx_slots: Vec<Option<Box<dyn NeighborTx>>>,
    mut rx_slots: Vec<Option<Box<dyn NeighborRx>>>,
    watchdog: Option<&WatchdogHandle>,
) -> (Vec<f64>, Vec<f64>) {
    let mut slab = workload.initial_slab(t);
    let mut rng = workload.rng_for(t);
    let mut times = Vec::with_capacity(workload.iterations);
    let rows = workload.rows;

    for i in 0..workload.iterations {
        let started = Instant::now();

        {
            let rx = rx_slots[i].as_mut();
            let tx = tx_slots[i].as_mut();
            run_kernel(workload, &mut slab, &mut rng, i, t, rx, tx, rows);
        }
        // The iteration's links die with the kernel: the source promise is
        // dropped here, the destination once the neighbour drops its end.
        rx_slots[i] = None;
        tx_slots[i] = None;

        times.push(started.elapsed().as_secs_f64());
        if let Some(watchdog) = watchdog {
            watchdog.reset();
        }
    }

    (times, slab)
}

#[allow(clippy::too_many_arguments)]
fn run_kernel(
    workload: &Workload,
    slab: &mut [f64],
    rng: &mut rand::rngs::StdRng,
    iteration: usize,
    t: usize,
    mut rx: Option<&mut Box<dyn NeighborRx>>,
    mut tx: Option<&mut Box<dyn NeighborTx>>,
    rows: usize,
) {
    for r in 0..rows {
        let incoming = match rx.as_mut() {
            Some(rx) => rx.recv(r),
            None => workload.seed(iteration, r),
        };

        workload.spin_work(rng);
        slab[r] = workload.combine(slab[r], incoming, iteration, t, r);

        if let Some(tx) = tx.as_mut() {
            if r + 1 == rows {
                tx.send_last(r, slab[r]);
            } else {
                tx.send(r, slab[r]);
            }
        }
    }
}

// ---------------------------------------------------------------------
// Shared-plane driver (alt-bit / counter synchronizers)
// ---------------------------------------------------------------------

/// Iteration-granular neighbour ordering: worker `t` may read its left
/// neighbour's plane for iteration `i` only after `wait_left(t, i)` returns,
/// and announces its own plane with `signal_right(t, i)`.
pub trait NeighborBarrier: Sync {
    fn wait_left(&self, t: usize, iteration: usize);
    fn signal_right(&self, t: usize, iteration: usize);
}

/// Per-worker plane history: `planes[t][i + 1]` is worker `t`'s slab after
/// iteration `i`, `planes[t][0]` the initial slab.
///
/// Keeping every iteration's plane (instead of updating in place) is what
/// makes the iteration-granular protocols race-free: worker `t` reads its
/// neighbour's plane `i + 1` while the neighbour is already writing plane
/// `i + 2`.
struct PlaneStore {
    planes: Vec<UnsafeCell<Vec<Vec<f64>>>>,
}

// Safety: worker t writes only planes[t]; it reads planes[t - 1][i + 1] only
// after the barrier protocol ordered it behind the write (release/acquire on
// the protocol's atomics).
unsafe impl Sync for PlaneStore {}

impl PlaneStore {
    fn new(workload: &Workload) -> Self {
        let planes = (0..workload.threads)
            .map(|t| {
                let mut history = vec![vec![0.0; workload.rows]; workload.iterations + 1];
                history[0] = workload.initial_slab(t);
                UnsafeCell::new(history)
            })
            .collect();
        Self { planes }
    }
}

/// Runs the stencil with iteration-granular neighbour ordering.
pub fn run_plane_synced(
    workload: &Workload,
    barrier_protocol: &dyn NeighborBarrier,
    watchdog: Option<&WatchdogHandle>,
) -> PipelineRun {
    let threads = workload.threads;
    let store = PlaneStore::new(workload);
    let barrier = Barrier::new(threads);
    let started = Instant::now();

    let mut per_thread_times: Vec<Vec<f64>> = Vec::with_capacity(threads);
    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(threads);
        for t in 0..threads {
            let store = &store;
            let barrier = &barrier;
            let watchdog = watchdog.cloned();
            handles.push(scope.spawn(move || {
                ThreadRegistry::global().register_current_thread();
                barrier.wait();

                let mut rng = workload.rng_for(t);
                let mut times = Vec::with_capacity(workload.iterations);

                for i in 0..workload.iterations {
                    let iteration_started = Instant::now();
                    barrier_protocol.wait_left(t, i);

                    for r in 0..workload.rows {
                        let incoming = if t == 0 {
                            workload.seed(i, r)
                        } else {
                            // SAFETY: wait_left ordered us behind the left
                            // neighbour's signal for iteration i, which
                            // completed (and published) its plane i + 1.
                            unsafe { (&(&(*store.planes[t - 1].get()))[i + 1])[r] }
                        };

                        workload.spin_work(&mut rng);

                        // SAFETY: worker t is the only writer of planes[t].
                        unsafe {
                            let history = &mut *store.planes[t].get();
                            let previous = history[i][r];
                            history[i + 1][r] =
                                workload.combine(previous, incoming, i, t, r);
                        }
                    }

                    barrier_protocol.signal_right(t, i);
                    times.push(iteration_started.elapsed().as_secs_f64());
                    if let Some(watchdog) = watchdog.as_ref() {
                        watchdog.reset();
                    }
                }

                times
            }));
        }
        for handle in handles {
            per_thread_times.push(handle.join().expect("worker panicked"));
        }
    });

    let elapsed = started.elapsed();
    let mut iteration_times = vec![vec![0.0; threads]; workload.iterations];
    for (t, times) in per_thread_times.into_iter().enumerate() {
        for (i, seconds) in times.into_iter().enumerate() {
            iteration_times[i][t] = seconds;
        }
    }

    let slabs = store
        .planes
        .into_iter()
        .map(|history| history.into_inner()[workload.iterations].clone())
        .collect();

    PipelineRun {
        elapsed,
        iteration_times,
        slabs,
    }
}

/// Runs the whole stencil on the calling thread, in dependency order.
pub fn run_sequential(workload: &Workload, watchdog: Option<&WatchdogHandle>) -> PipelineRun {
    let started = Instant::now();
    let mut slabs: Vec<Vec<f64>> = (0..workload.threads)
        .map(|t| workload.initial_slab(t))
        .collect();
    let mut rng = workload.rng_for(0);
    let mut iteration_times = Vec::with_capacity(workload.iterations);

    for i in 0..workload.iterations {
        let iteration_started = Instant::now();
        for t in 0..workload.threads {
            for r in 0..workload.rows {
                let incoming = if t == 0 {
                    workload.seed(i, r)
                } else {
                    slabs[t - 1][r]
                };
                workload.spin_work(&mut rng);
                slabs[t][r] = workload.combine(slabs[t][r], incoming, i, t, r);
            }
        }
        iteration_times.push(vec![iteration_started.elapsed().as_secs_f64()]);
        if let Some(watchdog) = watchdog {
            watchdog.reset();
        }
    }

    PipelineRun {
        elapsed: started.elapsed(),
        iteration_times,
        slabs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkloadConfig;

    fn workload(threads: usize) -> Workload {
        Workload::new(
            threads,
            WorkloadConfig {
                iterations: 5,
                rows: 16,
                spin: 50,
            },
        )
    }

    #[test]
    fn test_sequential_matches_reference() {
        let w = workload(3);
        let run = run_sequential(&w, None);
        assert_eq!(run.slabs, w.reference());
        assert_eq!(run.iteration_times.len(), w.iterations);
    }

    #[test]
    fn test_linked_static_matches_reference() {
        ThreadRegistry::global().register_current_thread();
        let w = workload(4);
        let run = run_linked(&w, LinkKind::Static { step: 4 }, None);
        assert_eq!(run.slabs, w.reference());
        assert_eq!(run.iteration_times.len(), w.iterations);
        assert_eq!(run.iteration_times[0].len(), 4);
    }

    #[test]
    fn test_linked_single_worker_has_no_links() {
        ThreadRegistry::global().register_current_thread();
        let w = workload(1);
        let run = run_linked(&w, LinkKind::OneShotArray, None);
        assert_eq!(run.slabs, w.reference());
    }
}
