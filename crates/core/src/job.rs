//! Job records and the status state machine.
//!
//! A [`JobRecord`] is one queued video. Its full-processing lifecycle is
//!
//! ```text
//! Idle ──submit──▶ Submitting ──task handle──▶ Processing ──▶ Completed
//!  ▲  ▲                │                           │  │
//!  │  └──rejected──────┘                           │  └──▶ Failed ──submit──▶ Submitting
//!  └────────────────────────cancel─────────────────┘
//! ```
//!
//! Preview state (`preview_*`) is a separate axis and never touches
//! `status`. Transition methods return [`CoreError::InvalidTransition`]
//! instead of silently overwriting a state they do not expect.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::effects::{validate_blur_radius, validate_lighting_strength, BackgroundChoice, Rgb};
use crate::error::CoreError;
use crate::media::MediaFile;
use crate::types::{JobId, TaskHandle, Timestamp};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Full-processing status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Idle,
    Submitting,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Only idle and failed jobs may be (re)submitted.
    pub fn can_submit(self) -> bool {
        matches!(self, JobStatus::Idle | JobStatus::Failed)
    }

    /// Whether a request or poll loop is currently in flight for this job.
    pub fn is_active(self) -> bool {
        matches!(self, JobStatus::Submitting | JobStatus::Processing)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Idle => "idle",
            JobStatus::Submitting => "submitting",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// JobRecord
// ---------------------------------------------------------------------------

/// One queued video and everything the UI needs to render it.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: JobId,
    /// The uploaded video. Never replaced after creation.
    pub source: Arc<MediaFile>,
    pub background_media: Option<Arc<MediaFile>>,
    pub background_color: Rgb,
    /// Which of `background_color` / `background_media` was set last.
    pub background_choice: BackgroundChoice,
    /// Percentage, `0..=100`.
    pub blur_radius: u8,
    /// Percentage, `0..=100`. Sent to the service divided by 100.
    pub lighting_strength: u8,

    pub status: JobStatus,
    /// Percentage, `0..=100`. Meaningful while `Processing`.
    pub progress: u8,
    /// Present iff a poll loop is attached.
    pub task_handle: Option<TaskHandle>,
    /// Absolute URL of the finished video.
    pub result_url: Option<String>,
    pub last_error: Option<String>,

    /// Absolute URL of the latest applied single-frame preview.
    pub preview_url: Option<String>,
    pub preview_pending: bool,
    /// Sequence number of the most recently issued preview request.
    pub preview_seq: u64,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl JobRecord {
    /// A fresh idle job with default effect parameters.
    pub fn new(source: MediaFile) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: JobId::new(),
            source: Arc::new(source),
            background_media: None,
            background_color: Rgb::default(),
            background_choice: BackgroundChoice::Color,
            blur_radius: 0,
            lighting_strength: 0,
            status: JobStatus::Idle,
            progress: 0,
            task_handle: None,
            result_url: None,
            last_error: None,
            preview_url: None,
            preview_pending: false,
            preview_seq: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark the record as modified.
    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now();
    }

    /// The background image, if it is the background currently in effect.
    pub fn effective_background(&self) -> Option<&Arc<MediaFile>> {
        match self.background_choice {
            BackgroundChoice::Image => self.background_media.as_ref(),
            BackgroundChoice::Color => None,
        }
    }

    /// Snapshot the parameters a compositing request needs.
    pub fn composite_request(&self) -> CompositeRequest {
        CompositeRequest {
            job_id: self.id,
            video: Arc::clone(&self.source),
            background: self.effective_background().cloned(),
            color: self.background_color,
            blur_radius: self.blur_radius,
            lighting_strength: self.lighting_strength,
        }
    }

    // -- effect parameters --------------------------------------------------

    pub fn set_background_color(&mut self, color: Rgb) {
        self.background_color = color;
        self.background_choice = BackgroundChoice::Color;
    }

    pub fn set_background_image(&mut self, image: MediaFile) {
        self.background_media = Some(Arc::new(image));
        self.background_choice = BackgroundChoice::Image;
    }

    pub fn clear_background_image(&mut self) {
        self.background_media = None;
        self.background_choice = BackgroundChoice::Color;
    }

    /// Apply a user edit, validating numeric ranges first.
    ///
    /// Edits are allowed in any status; they only affect the next request.
    pub fn apply_edit(&mut self, edit: ParamEdit) -> Result<(), CoreError> {
        match edit {
            ParamEdit::BackgroundColor(color) => self.set_background_color(color),
            ParamEdit::BackgroundImage(image) => self.set_background_image(image),
            ParamEdit::ClearBackgroundImage => self.clear_background_image(),
            ParamEdit::BlurRadius(value) => self.blur_radius = validate_blur_radius(value)?,
            ParamEdit::LightingStrength(value) => {
                self.lighting_strength = validate_lighting_strength(value)?
            }
        }
        Ok(())
    }

    // -- full-processing transitions ----------------------------------------

    /// `Idle | Failed -> Submitting`, clearing the previous attempt's error,
    /// result and progress.
    pub fn begin_submission(&mut self) -> Result<(), CoreError> {
        if !self.status.can_submit() {
            return Err(self.invalid("submit"));
        }
        self.status = JobStatus::Submitting;
        self.progress = 0;
        self.last_error = None;
        self.result_url = None;
        self.task_handle = None;
        Ok(())
    }

    /// `Submitting -> Processing`, attaching the service's task handle.
    pub fn attach_task(&mut self, handle: TaskHandle) -> Result<(), CoreError> {
        if self.status != JobStatus::Submitting {
            return Err(self.invalid("attach a task to"));
        }
        self.status = JobStatus::Processing;
        self.progress = 0;
        self.task_handle = Some(handle);
        Ok(())
    }

    /// `Submitting -> Idle` after the service refused or never received the job.
    pub fn reject_submission(&mut self, message: impl Into<String>) -> Result<(), CoreError> {
        if self.status != JobStatus::Submitting {
            return Err(self.invalid("reject the submission of"));
        }
        self.status = JobStatus::Idle;
        self.last_error = Some(message.into());
        Ok(())
    }

    /// Record a progress report while processing.
    ///
    /// Progress never moves backwards within one submission, so a late
    /// response cannot undo a newer one. Returns `true` if the value changed.
    pub fn record_progress(&mut self, reported: i64) -> bool {
        if self.status != JobStatus::Processing {
            return false;
        }
        let reported = reported.clamp(0, 100) as u8;
        if reported > self.progress {
            self.progress = reported;
            true
        } else {
            false
        }
    }

    /// `Processing -> Completed`.
    pub fn complete(&mut self, result_url: Option<String>) -> Result<(), CoreError> {
        if self.status != JobStatus::Processing {
            return Err(self.invalid("complete"));
        }
        self.status = JobStatus::Completed;
        self.result_url = result_url;
        self.task_handle = None;
        Ok(())
    }

    /// `Processing -> Failed`.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), CoreError> {
        if self.status != JobStatus::Processing {
            return Err(self.invalid("fail"));
        }
        self.status = JobStatus::Failed;
        self.last_error = Some(message.into());
        self.task_handle = None;
        Ok(())
    }

    /// `Submitting | Processing -> Idle` on user cancellation.
    ///
    /// The remote task, if any, is abandoned rather than stopped.
    pub fn cancel(&mut self) -> Result<(), CoreError> {
        if !self.status.is_active() {
            return Err(self.invalid("cancel"));
        }
        self.status = JobStatus::Idle;
        self.progress = 0;
        self.task_handle = None;
        Ok(())
    }

    /// Whether `handle` is the task this record is currently waiting on.
    pub fn is_tracking(&self, handle: &TaskHandle) -> bool {
        self.status == JobStatus::Processing && self.task_handle.as_ref() == Some(handle)
    }

    // -- preview ------------------------------------------------------------

    /// Issue a new preview sequence number, superseding any in-flight one.
    pub fn begin_preview(&mut self) -> u64 {
        self.preview_seq += 1;
        self.preview_pending = true;
        self.preview_seq
    }

    /// Apply a preview response if it answers the latest request.
    ///
    /// Returns `false` (and changes nothing) for stale responses.
    pub fn apply_preview(&mut self, seq: u64, preview_url: String) -> bool {
        if seq != self.preview_seq {
            return false;
        }
        self.preview_url = Some(preview_url);
        self.preview_pending = false;
        true
    }

    /// Clear the pending flag after the latest preview request failed.
    ///
    /// The previous preview, if any, is kept. Returns `false` for stale failures.
    pub fn abandon_preview(&mut self, seq: u64) -> bool {
        if seq != self.preview_seq {
            return false;
        }
        self.preview_pending = false;
        true
    }

    fn invalid(&self, action: &'static str) -> CoreError {
        CoreError::InvalidTransition {
            from: self.status,
            action,
        }
    }
}

// ---------------------------------------------------------------------------
// ParamEdit
// ---------------------------------------------------------------------------

/// A user-facing change to one effect parameter.
#[derive(Debug, Clone)]
pub enum ParamEdit {
    BackgroundColor(Rgb),
    BackgroundImage(MediaFile),
    ClearBackgroundImage,
    /// Raw slider value, validated against `0..=MAX_BLUR_RADIUS`.
    BlurRadius(i64),
    /// Raw slider value, validated against `0..=MAX_LIGHTING_STRENGTH`.
    LightingStrength(i64),
}

// ---------------------------------------------------------------------------
// JobPatch
// ---------------------------------------------------------------------------

/// A partial set of fields merged into a record by id.
///
/// `None` leaves the field untouched; for optional fields `Some(None)`
/// clears it. No transition rules are checked; this is the raw merge.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub background_media: Option<Option<Arc<MediaFile>>>,
    pub background_color: Option<Rgb>,
    pub background_choice: Option<BackgroundChoice>,
    pub blur_radius: Option<u8>,
    pub lighting_strength: Option<u8>,
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub task_handle: Option<Option<TaskHandle>>,
    pub result_url: Option<Option<String>>,
    pub last_error: Option<Option<String>>,
    pub preview_url: Option<Option<String>>,
    pub preview_pending: Option<bool>,
}

impl JobPatch {
    /// Merge the set fields into `record`.
    pub fn apply(self, record: &mut JobRecord) {
        if let Some(v) = self.background_media {
            record.background_media = v;
        }
        if let Some(v) = self.background_color {
            record.background_color = v;
        }
        if let Some(v) = self.background_choice {
            record.background_choice = v;
        }
        if let Some(v) = self.blur_radius {
            record.blur_radius = v;
        }
        if let Some(v) = self.lighting_strength {
            record.lighting_strength = v;
        }
        if let Some(v) = self.status {
            record.status = v;
        }
        if let Some(v) = self.progress {
            record.progress = v;
        }
        if let Some(v) = self.task_handle {
            record.task_handle = v;
        }
        if let Some(v) = self.result_url {
            record.result_url = v;
        }
        if let Some(v) = self.last_error {
            record.last_error = v;
        }
        if let Some(v) = self.preview_url {
            record.preview_url = v;
        }
        if let Some(v) = self.preview_pending {
            record.preview_pending = v;
        }
    }
}

// ---------------------------------------------------------------------------
// CompositeRequest
// ---------------------------------------------------------------------------

/// Parameters of one submission or preview request, captured from a record.
#[derive(Debug, Clone)]
pub struct CompositeRequest {
    pub job_id: JobId,
    pub video: Arc<MediaFile>,
    /// Only set when the image is the background in effect.
    pub background: Option<Arc<MediaFile>>,
    pub color: Rgb,
    pub blur_radius: u8,
    /// Stored percentage; the wire format is `lighting_strength / 100`.
    pub lighting_strength: u8,
}
