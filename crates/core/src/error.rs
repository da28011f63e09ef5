use crate::job::JobStatus;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Cannot {action} a job that is {from}")]
    InvalidTransition {
        from: JobStatus,
        action: &'static str,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
