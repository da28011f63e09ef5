//! Errors from the compositing service boundary.

/// A failed exchange with the compositing service.
///
/// Each operation maps its failures onto one variant so callers can
/// react per operation: submission failures are surfaced to the user,
/// status-poll failures are retried silently, preview failures become a
/// transient notification.
#[derive(Debug, thiserror::Error)]
pub enum CompositorError {
    /// The job submission was not accepted (transport failure or non-2xx).
    #[error("Submission failed: {message}")]
    Submission {
        /// HTTP status code, when the service answered at all.
        status: Option<u16>,
        message: String,
    },

    /// A status poll did not produce a usable answer.
    #[error("Status request failed: {0}")]
    Transport(String),

    /// A preview request failed; `detail` is the service's explanation.
    #[error("Preview failed: {detail}")]
    Preview {
        status: Option<u16>,
        detail: String,
    },

    /// The service answered 2xx with a body we could not interpret.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Building the HTTP client or a request failed.
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    /// Writing a downloaded result failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CompositorError {
    /// Whether retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            CompositorError::Transport(_) | CompositorError::InvalidResponse(_) => true,
            CompositorError::Submission { status, .. } | CompositorError::Preview { status, .. } => {
                status.map_or(true, |s| s >= 500)
            }
            CompositorError::Client(_) | CompositorError::Io(_) => false,
        }
    }

    /// The HTTP status attached to the failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            CompositorError::Submission { status, .. } | CompositorError::Preview { status, .. } => {
                *status
            }
            _ => None,
        }
    }
}
