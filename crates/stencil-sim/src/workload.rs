use crate::config::WorkloadConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::hint;

/// The synthetic stencil every synchronizer drives.
///
/// Worker `t` owns one slab of `rows` cells and runs `iterations` passes over
/// it. The value of cell `(t, i, r)` depends on the worker's own previous
/// pass and on the neighbour's value for the *same* pass:
///
/// ```text
/// v[t][i][r] = v[t][i-1][r] * 0.5 + incoming * 0.25 + cell(i, t, r)
/// incoming   = v[t-1][i][r]   (t > 0)   |   seed(i, r)   (t == 0)
/// ```
///
/// The arithmetic is identical in every schedule, so the slabs of a correct
/// parallel run are bit-for-bit equal to the sequential reference; an
/// ordering bug in a synchronizer shows up as a value mismatch, not just as
/// a timing artefact.
///
/// Busy work per row is a spin loop with per-worker jitter; the jitter only
/// perturbs timing, never values.
#[derive(Debug, Clone, Copy)]
pub struct Workload {
    pub threads: usize,
    pub iterations: usize,
    pub rows: usize,
    spin: u64,
}

impl Workload {
    pub fn new(threads: usize, config: WorkloadConfig) -> Self {
        assert!(threads >= 1, "at least one worker is required");
        assert!(config.iterations >= 1, "at least one iteration is required");
        assert!(config.rows >= 1, "at least one row is required");
        Self {
            threads,
            iterations: config.iterations,
            rows: config.rows,
            spin: config.spin,
        }
    }

    /// Boundary input of worker 0.
    #[inline]
    pub fn seed(&self, iteration: usize, row: usize) -> f64 {
        (iteration * 31 + row) as f64 * 0.01
    }

    /// Per-cell forcing term.
    #[inline]
    pub fn cell(&self, iteration: usize, thread: usize, row: usize) -> f64 {
        (iteration * 7 + thread * 3 + row) as f64 * 0.001
    }

    /// One cell update; the only arithmetic in the kernel.
    #[inline]
    pub fn combine(
        &self,
        previous: f64,
        incoming: f64,
        iteration: usize,
        thread: usize,
        row: usize,
    ) -> f64 {
        previous * 0.5 + incoming * 0.25 + self.cell(iteration, thread, row)
    }

    /// Fresh per-worker slab.
    pub fn initial_slab(&self, thread: usize) -> Vec<f64> {
        (0..self.rows).map(|r| (thread + r) as f64 * 0.1).collect()
    }

    /// Busy work standing in for the matrix kernel; `rng` jitters the loop
    /// count by up to 25% so workers drift apart like real kernels do.
    #[inline]
    pub fn spin_work(&self, rng: &mut StdRng) {
        let jitter = if self.spin >= 4 {
            rng.gen_range(0..=self.spin / 4)
        } else {
            0
        };
        for _ in 0..self.spin + jitter {
            hint::spin_loop();
        }
    }

    /// Deterministic per-worker RNG for the spin jitter.
    pub fn rng_for(&self, thread: usize) -> StdRng {
        StdRng::seed_from_u64(0x5eed ^ thread as u64)
    }

    /// The sequential reference result: `[thread][row]` after the final
    /// iteration. Every synchronizer must reproduce it exactly.
    pub fn reference(&self) -> Vec<Vec<f64>> {
        let mut slabs: Vec<Vec<f64>> = (0..self.threads).map(|t| self.initial_slab(t)).collect();

        for i in 0..self.iterations {
            for t in 0..self.threads {
                for r in 0..self.rows {
                    let incoming = if t == 0 {
                        self.seed(i, r)
                    } else {
                        slabs[t - 1][r]
                    };
                    slabs[t][r] = self.combine(slabs[t][r], incoming, i, t, r);
                }
            }
        }

        slabs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workload() -> Workload {
        Workload::new(
            3,
            WorkloadConfig {
                iterations: 4,
                rows: 8,
                spin: 0,
            },
        )
    }

    #[test]
    fn test_reference_is_deterministic() {
        let w = workload();
        assert_eq!(w.reference(), w.reference());
    }

    #[test]
    fn test_reference_couples_neighbours() {
        let w = workload();
        let reference = w.reference();

        // Worker 1's result must depend on worker 0's values: recomputing
        // with the neighbour replaced by the seed diverges.
        let mut decoupled = w.initial_slab(1);
        for i in 0..w.iterations {
            for r in 0..w.rows {
                let incoming = w.seed(i, r);
                decoupled[r] = w.combine(decoupled[r], incoming, i, 1, r);
            }
        }
        assert_ne!(reference[1], decoupled);
    }
}
