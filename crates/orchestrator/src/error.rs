use veditor_core::error::CoreError;
use veditor_core::types::JobId;

/// Errors returned by [`JobOrchestrator`](crate::JobOrchestrator) operations.
///
/// Failures of the remote exchange itself are never returned here: they
/// are written back onto the record and published as events, because the
/// request they belong to outlives the call that started it.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// Validation or transition rule violated.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// No record with this id exists (or it was removed).
    #[error("Job {0} not found")]
    JobNotFound(JobId),

    /// No record is selected.
    #[error("No active job")]
    NoActiveJob,

    /// [`JobOrchestrator::shutdown`](crate::JobOrchestrator::shutdown) was called.
    #[error("Orchestrator is shutting down")]
    ShuttingDown,
}
