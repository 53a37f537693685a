//! stepsync - Synchronization primitives for staged parallel pipelines
//!
//! The centrepiece is the forward-index promise: a one-writer/many-reader
//! rendezvous over a monotone index stream, used to hand partial results of a
//! stencil iteration from one worker to its right-hand neighbour. Publication
//! is batched: the producer only makes progress visible every `step` indices,
//! trading wake-up latency for synchronization cost.
//!
//! Two flavours are provided:
//!
//! - [`StaticStepPromise`]: the step is fixed at construction.
//! - [`DynamicStepPromise`]: the step can be retuned at runtime by the
//!   producer, the consumers, both, or an internal timer (see [`StepRule`]).
//!
//! Around them sit the supporting pieces every multi-threaded harness needs:
//!
//! - [`ThreadRegistry`]: dense integer ids for registered threads, used to
//!   index per-thread state such as the promise read cache.
//! - [`Watchdog`]: a liveness monitor that aborts the process when no
//!   monitored thread has made progress for a configured interval.
//!
//! Spin waits use [`Backoff`] (re-exported from `crossbeam-utils`), so every
//! busy loop in the workspace shares one adaptive spin/yield strategy.
//!
//! # Example
//!
//! ```
//! use stepsync::{StaticStepPromise, ThreadRegistry, WaitMode};
//!
//! ThreadRegistry::global().register_current_thread();
//!
//! let (mut setter, promise) =
//!     StaticStepPromise::<u64>::with_capacity(4, 2, 1, WaitMode::Spin);
//!
//! setter.set(0, 10); // buffered, not yet visible
//! setter.set(1, 11); // publishes indices 0..=1
//! assert_eq!(*promise.get(1), 11);
//! setter.set(2, 12);
//! setter.set(3, 13);
//! setter.set_final(4, 14);
//! assert_eq!(*promise.get(4), 14);
//! ```

mod invariants;
mod promise;
mod registry;
mod watchdog;

pub use crossbeam_utils::Backoff;
pub use promise::{
    DynamicSetter, DynamicStepPromise, PromiseConfig, StaticSetter, StaticStepPromise, StepRule,
    WaitMode,
};
#[cfg(feature = "debug-counters")]
pub use promise::CounterSnapshot;
pub use registry::{spawn_registered, ThreadId, ThreadRegistry};
pub use watchdog::{Watchdog, WatchdogHandle};
