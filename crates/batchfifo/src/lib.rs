//! batchfifo - Adaptive bounded MPMC queues for staged pipelines
//!
//! Two queue families trade synchronization cost for latency by batching at
//! per-participant views:
//!
//! - [`SmartFifo`]: a lock-light queue carried by a forward-only chain of
//!   fixed-size chunks. Producers append under a coarse tail lock; consumers
//!   claim contiguous ranges of up to two adjacent chunks under a head lock
//!   and read them without copying. Drained chunks are reference-counted and
//!   freed as the stream moves on.
//! - [`QueueMaster`] + views: a single bounded ring under one mutex, with
//!   per-participant local rings that exchange whole batches with the master.
//!   The batch threshold (`step`) of every view can be retuned online by an
//!   [`Observer`] that watches producer and consumer service times.
//!
//! # Example
//!
//! ```
//! use batchfifo::{QueueMaster, ViewConfig};
//! use std::sync::Arc;
//!
//! let master = Arc::new(QueueMaster::<u64>::new(64, 1));
//! let mut producer = master.producer_view(ViewConfig::with_step(4));
//! let mut consumer = master.consumer_view(ViewConfig::with_step(4));
//!
//! for i in 0..10 {
//!     producer.push(i);
//! }
//! producer.terminate();
//!
//! let mut seen = Vec::new();
//! while let Some(v) = consumer.pop() {
//!     seen.push(v);
//! }
//! assert_eq!(seen, (0..10).collect::<Vec<_>>());
//! ```

mod invariants;
mod observer;
mod ringed;
mod semaphore;
mod smart;

pub use observer::{Observer, ObserverConfig};
pub use ringed::{ConsumerView, ProducerView, QueueMaster, Reconfigure, ResizeError, ViewConfig};
pub use ringed::LocalRing;
pub use semaphore::Semaphore;
pub use smart::{FifoElements, SmartConsumer, SmartFifo, SmartProducer};
