//! The seam between job orchestration and the compositing service.

use async_trait::async_trait;
use veditor_core::job::CompositeRequest;
use veditor_core::types::TaskHandle;

use crate::error::CompositorError;
use crate::messages::TaskStatus;

/// One request/response exchange per call; implementations hold no
/// per-job state.
#[async_trait]
pub trait CompositingService: Send + Sync {
    /// Upload a video for full processing.
    ///
    /// Fails with [`CompositorError::Submission`] when the request could not
    /// be delivered or the service did not accept it.
    async fn submit_job(&self, request: &CompositeRequest) -> Result<TaskHandle, CompositorError>;

    /// Ask where a submitted task stands.
    ///
    /// A task the service reports as failed is an `Ok` answer; only a
    /// failed exchange is an `Err`.
    async fn get_status(&self, handle: &TaskHandle) -> Result<TaskStatus, CompositorError>;

    /// Render a single preview frame and return its absolute URL.
    ///
    /// Fails with [`CompositorError::Preview`] carrying the service's detail.
    async fn submit_preview(&self, request: &CompositeRequest) -> Result<String, CompositorError>;
}
