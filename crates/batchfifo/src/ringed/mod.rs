//! Ringed master+view queue: one bounded central ring, per-participant
//! batching views, and batch thresholds retunable at runtime.

mod local;
mod master;
mod view;

pub use local::{LocalRing, ResizeError};
pub use master::QueueMaster;
pub use view::{ConsumerView, ProducerView, Reconfigure, ViewConfig};
