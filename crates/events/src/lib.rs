//! veditor job event bus.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`JobEvent`]: what changed in the job queue, for whoever renders it.

pub mod bus;

pub use bus::{EventBus, JobEvent};
