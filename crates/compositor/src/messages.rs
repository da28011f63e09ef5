//! Compositing service request/response types.
//!
//! The service answers JSON. Status payloads look like
//! `{"status": "processing", "progress": 42}` and gain `output_url` or
//! `error` once the task is terminal. Failed requests carry a FastAPI
//! style `{"detail": ...}` body.

use serde::Deserialize;

/// Message used when the service reports failure without saying why.
pub const UNKNOWN_FAILURE: &str = "Compositing failed without an error message";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Response to `POST /remove-background`.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    /// Server-assigned identifier for the queued task.
    pub task_id: String,
}

/// Remote task states as spelled on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteState {
    Queued,
    Processing,
    Completed,
    Failed,
}

/// Response to `GET /status/{task_id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    pub status: RemoteState,
    /// Completion percentage (0-100). Missing means "no news".
    #[serde(default)]
    pub progress: i64,
    /// Server-relative path of the finished video.
    #[serde(default)]
    pub output_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Response to `POST /preview`.
#[derive(Debug, Clone, Deserialize)]
pub struct PreviewResponse {
    /// Server-relative path of the rendered frame.
    pub preview_url: String,
}

/// Body of a non-2xx response.
///
/// `detail` is usually a string but FastAPI validation errors use a list
/// of objects, so it is kept as raw JSON and flattened for display.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub detail: serde_json::Value,
}

impl ErrorBody {
    pub fn message(&self) -> String {
        match &self.detail {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Extract the human-readable reason from an error response body.
///
/// Falls back to the raw body text when it is not an `ErrorBody`.
pub fn error_detail(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.message(),
        Err(_) if body.trim().is_empty() => "<empty body>".to_string(),
        Err(_) => body.trim().to_string(),
    }
}

// ---------------------------------------------------------------------------
// Domain view
// ---------------------------------------------------------------------------

/// Where a remote task stands, with URLs already made absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Queued,
    Processing,
    Completed { result_url: Option<String> },
    Failed { error: String },
}

/// One successful status poll.
///
/// A `Failed` state is still a successful poll: the request worked and
/// the service told us the job did not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStatus {
    pub state: TaskState,
    /// Reported completion percentage, unclamped.
    pub progress: i64,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self.state, TaskState::Completed { .. } | TaskState::Failed { .. })
    }
}

impl StatusResponse {
    /// Convert to the domain view, resolving `output_url` with `resolve`.
    pub fn into_status(self, resolve: impl Fn(&str) -> String) -> TaskStatus {
        let state = match self.status {
            RemoteState::Queued => TaskState::Queued,
            RemoteState::Processing => TaskState::Processing,
            RemoteState::Completed => TaskState::Completed {
                result_url: self.output_url.as_deref().map(&resolve),
            },
            RemoteState::Failed => TaskState::Failed {
                error: self
                    .error
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or_else(|| UNKNOWN_FAILURE.to_string()),
            },
        };
        TaskStatus {
            state,
            progress: self.progress,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn parse(json: &str) -> TaskStatus {
        serde_json::from_str::<StatusResponse>(json)
            .unwrap()
            .into_status(|p| format!("http://svc{p}"))
    }

    #[test]
    fn processing_status() {
        let status = parse(r#"{"status":"processing","progress":42}"#);
        assert_eq!(status.state, TaskState::Processing);
        assert_eq!(status.progress, 42);
        assert!(!status.is_terminal());
    }

    #[test]
    fn missing_progress_defaults_to_zero() {
        let status = parse(r#"{"status":"queued"}"#);
        assert_eq!(status.state, TaskState::Queued);
        assert_eq!(status.progress, 0);
    }

    #[test]
    fn completed_output_url_is_resolved() {
        let status = parse(
            r#"{"status":"completed","progress":100,"output_url":"/download/out_a.mp4"}"#,
        );
        assert_matches!(
            status.state,
            TaskState::Completed { result_url: Some(ref url) } if url == "http://svc/download/out_a.mp4"
        );
    }

    #[test]
    fn failed_without_message_gets_placeholder() {
        let status = parse(r#"{"status":"failed","progress":10,"error":""}"#);
        assert_matches!(status.state, TaskState::Failed { ref error } if error == UNKNOWN_FAILURE);
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!(serde_json::from_str::<StatusResponse>(r#"{"status":"paused"}"#).is_err());
    }

    #[test]
    fn error_detail_string_and_list() {
        assert_eq!(error_detail(r#"{"detail":"Video too long"}"#), "Video too long");
        let list = error_detail(r#"{"detail":[{"loc":["body","video"],"msg":"field required"}]}"#);
        assert!(list.contains("field required"));
        assert_eq!(error_detail("Internal Server Error"), "Internal Server Error");
        assert_eq!(error_detail(""), "<empty body>");
    }
}
