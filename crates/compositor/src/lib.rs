//! HTTP client for the remote AI compositing service.
//!
//! Provides the [`CompositingService`] seam used by the orchestrator,
//! its reqwest-backed implementation [`CompositingApi`], typed wire
//! messages, and the error taxonomy for submission, polling and preview
//! failures.

pub mod api;
pub mod config;
pub mod error;
pub mod messages;
pub mod service;

pub use api::CompositingApi;
pub use config::CompositorConfig;
pub use error::CompositorError;
pub use messages::TaskStatus;
pub use service::CompositingService;
