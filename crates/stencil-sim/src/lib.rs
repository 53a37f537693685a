//! stencil-sim - JSON-driven stencil pipeline benchmark harness
//!
//! Reads a simulations file describing a list of runs, executes each run's
//! synchronizer over a synthetic 3-D stencil workload, verifies every result
//! against the sequential reference, and emits JSON timing records.
//!
//! The synchronizer family spans the pre-promise protocols (`sequential`,
//! `alt_bit`, `counter`), one-shot rendezvous harnesses
//! (`array_of_promises`, `promise_of_array`) and the batched forward-index
//! promises under test (`static_step_plus` and the `dsp_*` dynamic-step
//! variants).

pub mod config;
pub mod driver;
pub mod links;
pub mod oneshot;
pub mod report;
pub mod runner;
pub mod sync;
pub mod workload;
