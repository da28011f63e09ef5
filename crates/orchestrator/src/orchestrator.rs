//! The job orchestrator: public entry point for everything a user can do
//! with the queue.
//!
//! [`JobOrchestrator`] owns the [`JobRegistry`] and spawns one background
//! task per submission (upload, then poll until terminal) and one per
//! preview request. Every task gets a child of the orchestrator's master
//! [`CancellationToken`] so a single record can be detached without
//! touching the others, and [`shutdown`](JobOrchestrator::shutdown) can
//! stop them all.
//!
//! Operations return as soon as the record reflects the new state. Their
//! remote outcome arrives later, written onto the record and announced on
//! the [`EventBus`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use veditor_compositor::CompositingService;
use veditor_core::error::CoreError;
use veditor_core::job::{CompositeRequest, JobRecord, JobStatus, ParamEdit};
use veditor_core::media::{validate_extension, MediaFile, MediaKind};
use veditor_core::types::JobId;
use veditor_events::{EventBus, JobEvent};

use crate::config::OrchestratorConfig;
use crate::error::OrchestratorError;
use crate::poller::poll_until_terminal;
use crate::preview::run_preview;
use crate::registry::{JobRegistry, RegistrySnapshot};

/// How long [`JobOrchestrator::shutdown`] waits for each task to exit.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Everything a background task needs, cheap to clone.
#[derive(Clone)]
pub(crate) struct TaskContext {
    pub(crate) registry: Arc<JobRegistry>,
    pub(crate) service: Arc<dyn CompositingService>,
    pub(crate) events: Arc<EventBus>,
    pub(crate) config: OrchestratorConfig,
    /// Bounds the number of uploads in flight.
    pub(crate) submissions: Arc<Semaphore>,
}

/// Drives job records through submission, polling and preview.
pub struct JobOrchestrator {
    ctx: TaskContext,
    /// Background tasks indexed by the record they belong to.
    tasks: RwLock<HashMap<JobId, JobTasks>>,
    /// Master cancellation token -- cancelled during shutdown.
    cancel: CancellationToken,
}

/// Background tasks attached to one record.
#[derive(Default)]
struct JobTasks {
    /// Submission followed by the poll loop.
    processing: Option<ManagedTask>,
    /// The newest preview request.
    preview: Option<ManagedTask>,
}

struct ManagedTask {
    task_handle: JoinHandle<()>,
    /// Child of the master token.
    cancel: CancellationToken,
}

impl JobOrchestrator {
    /// Create an orchestrator with its own event bus.
    pub fn new(service: Arc<dyn CompositingService>, config: OrchestratorConfig) -> Arc<Self> {
        Self::with_events(service, config, Arc::new(EventBus::default()))
    }

    /// Create an orchestrator publishing on an existing bus.
    pub fn with_events(
        service: Arc<dyn CompositingService>,
        config: OrchestratorConfig,
        events: Arc<EventBus>,
    ) -> Arc<Self> {
        let permits = config.max_concurrent_submissions.max(1);
        Arc::new(Self {
            ctx: TaskContext {
                registry: Arc::new(JobRegistry::new(Arc::clone(&events))),
                service,
                events,
                config,
                submissions: Arc::new(Semaphore::new(permits)),
            },
            tasks: RwLock::new(HashMap::new()),
            cancel: CancellationToken::new(),
        })
    }

    /// Subscribe to queue events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.ctx.events.subscribe()
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.ctx.registry
    }

    pub async fn snapshot(&self) -> RegistrySnapshot {
        self.ctx.registry.snapshot().await
    }

    pub async fn get(&self, id: JobId) -> Option<JobRecord> {
        self.ctx.registry.get(id).await
    }

    // -- queue --------------------------------------------------------------

    /// Queue one idle job per video. See [`JobRegistry::insert`].
    pub async fn insert(
        &self,
        files: Vec<MediaFile>,
        auto_select: bool,
    ) -> Result<Vec<JobId>, OrchestratorError> {
        let ids = self.ctx.registry.insert(files, auto_select).await?;
        tracing::info!(count = ids.len(), "Videos queued");
        Ok(ids)
    }

    /// Read videos from disk and queue them.
    ///
    /// Every path is checked before any file is read, and nothing is
    /// queued unless every file loads.
    pub async fn insert_paths<P: AsRef<Path>>(
        &self,
        paths: &[P],
        auto_select: bool,
    ) -> Result<Vec<JobId>, OrchestratorError> {
        for path in paths {
            let name = path.as_ref().file_name().and_then(|n| n.to_str()).unwrap_or("");
            validate_extension(MediaKind::Video, name)?;
        }
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            files.push(MediaFile::load(MediaKind::Video, path).await?);
        }
        self.insert(files, auto_select).await
    }

    /// Select a record. Unknown ids are ignored; returns whether it exists.
    pub async fn select(&self, id: JobId) -> bool {
        self.ctx.registry.select(id).await
    }

    /// Change an effect parameter of one record.
    pub async fn edit(&self, id: JobId, edit: ParamEdit) -> Result<(), OrchestratorError> {
        self.ctx
            .registry
            .try_modify(id, |record| record.apply_edit(edit))
            .await
            .ok_or(OrchestratorError::JobNotFound(id))??;
        Ok(())
    }

    /// Change an effect parameter of the active record.
    pub async fn edit_active(&self, edit: ParamEdit) -> Result<JobId, OrchestratorError> {
        let (id, result) = self
            .ctx
            .registry
            .try_modify_active(|record| record.apply_edit(edit))
            .await
            .ok_or(OrchestratorError::NoActiveJob)?;
        result?;
        Ok(id)
    }

    // -- full processing ----------------------------------------------------

    /// Submit one job for full processing.
    ///
    /// The record is `Submitting` when this returns. The upload, and the
    /// poll loop that follows an accepted upload, run in the background.
    pub async fn submit(&self, id: JobId) -> Result<(), OrchestratorError> {
        self.ensure_running()?;

        let request = self
            .ctx
            .registry
            .try_modify(id, |record| {
                record.begin_submission()?;
                Ok::<_, CoreError>(record.composite_request())
            })
            .await
            .ok_or(OrchestratorError::JobNotFound(id))??;

        tracing::info!(job_id = %id, "Job submitted");
        self.spawn_processing(id, request).await;
        Ok(())
    }

    /// Submit the active job.
    pub async fn submit_active(&self) -> Result<JobId, OrchestratorError> {
        let id = self
            .ctx
            .registry
            .active()
            .await
            .ok_or(OrchestratorError::NoActiveJob)?;
        self.submit(id).await?;
        Ok(id)
    }

    /// Submit every idle job that has no result yet.
    ///
    /// Returns the ids that were started. Each runs independently: one
    /// job's failure never affects another's. Uploads beyond
    /// `max_concurrent_submissions` wait for a free slot while their
    /// records show `Submitting`.
    pub async fn submit_all_idle(&self) -> Vec<JobId> {
        let snapshot = self.ctx.registry.snapshot().await;
        let candidates: Vec<JobId> = snapshot
            .records()
            .filter(|r| r.status == JobStatus::Idle && r.result_url.is_none())
            .map(|r| r.id)
            .collect();

        let mut started = Vec::with_capacity(candidates.len());
        for id in candidates {
            match self.submit(id).await {
                Ok(()) => started.push(id),
                Err(e) => {
                    tracing::debug!(job_id = %id, error = %e, "Skipping job in batch");
                }
            }
        }

        tracing::info!(count = started.len(), "Batch submitted");
        started
    }

    /// Stop waiting on a job.
    ///
    /// The record returns to `Idle` and its poll loop is detached. The
    /// remote task is abandoned, not stopped.
    pub async fn cancel(&self, id: JobId) -> Result<(), OrchestratorError> {
        self.ctx
            .registry
            .try_modify(id, |record| record.cancel())
            .await
            .ok_or(OrchestratorError::JobNotFound(id))??;

        if let Some(tasks) = self.tasks.write().await.get_mut(&id) {
            if let Some(task) = tasks.processing.take() {
                task.cancel.cancel();
            }
        }

        tracing::info!(job_id = %id, "Job cancelled");
        Ok(())
    }

    /// Drop a job from the queue, detaching all of its background tasks.
    pub async fn remove(&self, id: JobId) -> Result<JobRecord, OrchestratorError> {
        if let Some(tasks) = self.tasks.write().await.remove(&id) {
            tasks.cancel_all();
        }
        let record = self
            .ctx
            .registry
            .remove(id)
            .await
            .ok_or(OrchestratorError::JobNotFound(id))?;

        tracing::info!(job_id = %id, "Job removed");
        Ok(record)
    }

    // -- preview ------------------------------------------------------------

    /// Render a single preview frame with the record's current parameters.
    ///
    /// Supersedes any preview still in flight for this record. Returns the
    /// sequence number of the new request.
    pub async fn request_preview(&self, id: JobId) -> Result<u64, OrchestratorError> {
        self.ensure_running()?;

        let (seq, request) = self
            .ctx
            .registry
            .modify(id, |record| (record.begin_preview(), record.composite_request()))
            .await
            .ok_or(OrchestratorError::JobNotFound(id))?;

        let cancel = self.cancel.child_token();
        let ctx = self.ctx.clone();
        let task_cancel = cancel.clone();
        let task_handle = tokio::spawn(async move {
            run_preview(&ctx, id, seq, request, &task_cancel).await;
        });

        let superseded = self
            .tasks
            .write()
            .await
            .entry(id)
            .or_default()
            .preview
            .replace(ManagedTask {
                task_handle,
                cancel,
            });
        if let Some(previous) = superseded {
            previous.cancel.cancel();
        }

        tracing::debug!(job_id = %id, seq, "Preview requested");
        Ok(seq)
    }

    /// Preview the active record.
    pub async fn request_preview_active(&self) -> Result<(JobId, u64), OrchestratorError> {
        let id = self
            .ctx
            .registry
            .active()
            .await
            .ok_or(OrchestratorError::NoActiveJob)?;
        let seq = self.request_preview(id).await?;
        Ok((id, seq))
    }

    // -- lifecycle ----------------------------------------------------------

    /// Stop every background task.
    ///
    /// Cancels the master token, then waits up to 5 seconds per task for a
    /// clean exit. Records keep whatever state they had.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down job orchestrator");
        self.cancel.cancel();

        let mut tasks = self.tasks.write().await;
        for (id, job) in tasks.drain() {
            for task in [job.processing, job.preview].into_iter().flatten() {
                task.cancel.cancel();
                if tokio::time::timeout(SHUTDOWN_GRACE, task.task_handle)
                    .await
                    .is_err()
                {
                    tracing::warn!(job_id = %id, "Background task did not stop in time");
                }
            }
        }

        tracing::info!("Job orchestrator shut down complete");
    }

    // ---- private helpers ----

    fn ensure_running(&self) -> Result<(), OrchestratorError> {
        if self.cancel.is_cancelled() {
            Err(OrchestratorError::ShuttingDown)
        } else {
            Ok(())
        }
    }

    /// Spawn the upload-then-poll task for a record already `Submitting`.
    async fn spawn_processing(&self, id: JobId, request: CompositeRequest) {
        let cancel = self.cancel.child_token();
        let ctx = self.ctx.clone();
        let task_cancel = cancel.clone();
        let task_handle = tokio::spawn(async move {
            run_processing(ctx, id, request, task_cancel).await;
        });

        let replaced = self
            .tasks
            .write()
            .await
            .entry(id)
            .or_default()
            .processing
            .replace(ManagedTask {
                task_handle,
                cancel,
            });
        if let Some(previous) = replaced {
            previous.cancel.cancel();
        }
    }
}

impl JobTasks {
    fn cancel_all(&self) {
        for task in [&self.processing, &self.preview].into_iter().flatten() {
            task.cancel.cancel();
        }
    }
}

/// Upload the job, then poll its task until it settles.
///
/// Runs until the job is terminal, its submission is refused, or the
/// token is cancelled.
async fn run_processing(
    ctx: TaskContext,
    job_id: JobId,
    request: CompositeRequest,
    cancel: CancellationToken,
) {
    let submitted = {
        let permit = tokio::select! {
            _ = cancel.cancelled() => return,
            permit = Arc::clone(&ctx.submissions).acquire_owned() => permit,
        };
        // Closed only if the semaphore is dropped, which cannot happen
        // while `ctx` is alive.
        let Ok(_permit) = permit else { return };

        tokio::select! {
            _ = cancel.cancelled() => return,
            result = ctx.service.submit_job(&request) => result,
        }
    };

    let handle = match submitted {
        Ok(handle) => handle,
        Err(e) => {
            let error = e.to_string();
            let rejected = ctx
                .registry
                .try_modify(job_id, |record| record.reject_submission(error.clone()))
                .await;
            match rejected {
                Some(Ok(())) => {
                    tracing::warn!(job_id = %job_id, error = %error, "Submission failed");
                    ctx.events.publish(JobEvent::SubmissionFailed { job_id, error });
                }
                _ => {
                    tracing::debug!(job_id = %job_id, "Submission failed for a job no longer waiting on it");
                }
            }
            return;
        }
    };

    let attached = ctx
        .registry
        .try_modify(job_id, |record| record.attach_task(handle.clone()))
        .await;
    if !matches!(attached, Some(Ok(()))) {
        tracing::warn!(
            job_id = %job_id,
            task_id = %handle,
            "Job no longer awaiting submission, abandoning remote task",
        );
        return;
    }

    tracing::info!(job_id = %job_id, task_id = %handle, "Polling compositing task");
    let outcome = poll_until_terminal(&ctx, job_id, &handle, &cancel).await;
    tracing::debug!(job_id = %job_id, task_id = %handle, ?outcome, "Poll loop exited");
}
