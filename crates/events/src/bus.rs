//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] carries [`JobEvent`]s from the orchestrator to the
//! presentation layer. It is designed to be shared via `Arc<EventBus>`.
//! Events are notifications only: the registry snapshot stays the source
//! of truth, so a lagging subscriber can always re-read it.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use veditor_core::job::JobStatus;
use veditor_core::types::JobId;

// ---------------------------------------------------------------------------
// JobEvent
// ---------------------------------------------------------------------------

/// Something that happened to the job queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// A record was appended to the queue.
    Inserted { job_id: JobId },

    /// The active (selected) record changed. `None` when the queue is empty.
    ActiveChanged { job_id: Option<JobId> },

    /// Any field of a record changed.
    Updated {
        job_id: JobId,
        status: JobStatus,
        /// Completion percentage (0-100).
        progress: u8,
    },

    /// The user removed a record.
    Removed { job_id: JobId },

    /// The service refused the submission or could not be reached.
    SubmissionFailed { job_id: JobId, error: String },

    /// The service reported the job as finished.
    Completed {
        job_id: JobId,
        result_url: Option<String>,
    },

    /// The job ended in failure (reported by the service or timed out).
    Failed { job_id: JobId, error: String },

    /// The latest preview request answered.
    PreviewReady { job_id: JobId, preview_url: String },

    /// The latest preview request failed. Transient; status is unaffected.
    PreviewFailed { job_id: JobId, error: String },

    /// A preview response arrived after a newer request and was dropped.
    PreviewDiscarded { job_id: JobId, seq: u64 },
}

impl JobEvent {
    /// The record this event is about, if any.
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            JobEvent::ActiveChanged { job_id } => *job_id,
            JobEvent::Inserted { job_id }
            | JobEvent::Updated { job_id, .. }
            | JobEvent::Removed { job_id }
            | JobEvent::SubmissionFailed { job_id, .. }
            | JobEvent::Completed { job_id, .. }
            | JobEvent::Failed { job_id, .. }
            | JobEvent::PreviewReady { job_id, .. }
            | JobEvent::PreviewFailed { job_id, .. }
            | JobEvent::PreviewDiscarded { job_id, .. } => Some(*job_id),
        }
    }

    /// Dot-separated event name, e.g. `"job.completed"`.
    pub fn event_type(&self) -> &'static str {
        match self {
            JobEvent::Inserted { .. } => "job.inserted",
            JobEvent::ActiveChanged { .. } => "job.active_changed",
            JobEvent::Updated { .. } => "job.updated",
            JobEvent::Removed { .. } => "job.removed",
            JobEvent::SubmissionFailed { .. } => "job.submission_failed",
            JobEvent::Completed { .. } => "job.completed",
            JobEvent::Failed { .. } => "job.failed",
            JobEvent::PreviewReady { .. } => "preview.ready",
            JobEvent::PreviewFailed { .. } => "preview.failed",
            JobEvent::PreviewDiscarded { .. } => "preview.discarded",
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// # Usage
///
/// ```rust
/// use veditor_core::types::JobId;
/// use veditor_events::{EventBus, JobEvent};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(JobEvent::Inserted { job_id: JobId::new() });
/// ```
pub struct EventBus {
    sender: broadcast::Sender<JobEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: JobEvent) {
        // A SendError only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
