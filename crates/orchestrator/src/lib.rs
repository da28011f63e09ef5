//! Client-side orchestration of compositing jobs.
//!
//! The [`JobRegistry`] is the single source of truth for every queued
//! video. The [`JobOrchestrator`] drives records through their lifecycle:
//! it submits jobs (alone or as a batch), attaches one poll loop per
//! accepted task, renders previews, and reacts to cancellation and
//! removal. Progress is published on the [`EventBus`](veditor_events::EventBus).

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod poller;
pub mod preview;
pub mod registry;

pub use config::OrchestratorConfig;
pub use error::OrchestratorError;
pub use orchestrator::JobOrchestrator;
pub use poller::PollOutcome;
pub use registry::{JobRegistry, RegistrySnapshot};
