//! Per-task status poll loop.
//!
//! One loop runs for each task handle the service hands out. Each tick
//! it sleeps for the poll interval, checks that the record still waits
//! on this handle, asks the service for the task's status and writes
//! the answer back. The loop ends when the service reports a terminal
//! state, the deadline passes, or the record stops tracking the handle
//! (cancelled, removed or resubmitted).
//!
//! A failed status request is logged and retried on the next tick. It
//! never changes the record: only the service saying "failed" fails a
//! job.

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use veditor_compositor::messages::{TaskState, TaskStatus};
use veditor_core::types::{JobId, TaskHandle};
use veditor_events::JobEvent;

use crate::orchestrator::TaskContext;

/// `last_error` written when a task never reaches a terminal state.
pub const POLL_TIMEOUT_MESSAGE: &str = "Timed out waiting for the compositing service";

/// Why a poll loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The service finished the job; the record is `Completed`.
    Completed,
    /// The service reported a failure; the record is `Failed`.
    Failed,
    /// The deadline passed; the record is `Failed`.
    TimedOut,
    /// The loop was cancelled or the record no longer tracks this handle.
    /// Nothing was written.
    Detached,
}

/// Poll `handle` until the job reaches a terminal state or the loop is
/// detached.
pub(crate) async fn poll_until_terminal(
    ctx: &TaskContext,
    job_id: JobId,
    handle: &TaskHandle,
    cancel: &CancellationToken,
) -> PollOutcome {
    let deadline = Instant::now() + ctx.config.poll_timeout;
    let mut consecutive_misses: u32 = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return PollOutcome::Detached,
            _ = tokio::time::sleep(ctx.config.poll_interval) => {}
        }

        if !still_tracking(ctx, job_id, handle).await {
            tracing::debug!(job_id = %job_id, task_id = %handle, "Record moved on, stopping poll loop");
            return PollOutcome::Detached;
        }

        if Instant::now() >= deadline {
            return time_out(ctx, job_id, handle).await;
        }

        let status = tokio::select! {
            _ = cancel.cancelled() => return PollOutcome::Detached,
            result = ctx.service.get_status(handle) => result,
        };

        match status {
            Ok(status) => {
                consecutive_misses = 0;
                if let Some(outcome) = reconcile(ctx, job_id, handle, status).await {
                    return outcome;
                }
            }
            Err(e) => {
                consecutive_misses += 1;
                tracing::warn!(
                    job_id = %job_id,
                    task_id = %handle,
                    consecutive_misses,
                    error = %e,
                    "Status poll failed, retrying on next tick",
                );
            }
        }
    }
}

// ---- private helpers ----

async fn still_tracking(ctx: &TaskContext, job_id: JobId, handle: &TaskHandle) -> bool {
    ctx.registry
        .get(job_id)
        .await
        .is_some_and(|record| record.is_tracking(handle))
}

/// Why a status answer was not committed.
enum Skip {
    /// The record stopped waiting on this handle between check and write.
    NotTracking,
    /// Non-terminal answer with no new progress; avoids an update per tick.
    Unchanged,
}

/// Write one status answer onto the record.
///
/// Returns the loop outcome once the task is terminal or the record no
/// longer tracks it.
async fn reconcile(
    ctx: &TaskContext,
    job_id: JobId,
    handle: &TaskHandle,
    status: TaskStatus,
) -> Option<PollOutcome> {
    let TaskStatus { state, progress } = status;
    let committed = ctx
        .registry
        .try_modify(job_id, |record| {
            if !record.is_tracking(handle) {
                return Err(Skip::NotTracking);
            }
            let advanced = record.record_progress(progress);
            match &state {
                TaskState::Completed { result_url } => {
                    record
                        .complete(result_url.clone())
                        .map_err(|_| Skip::NotTracking)?;
                }
                TaskState::Failed { error } => {
                    record.fail(error.clone()).map_err(|_| Skip::NotTracking)?;
                }
                TaskState::Queued | TaskState::Processing if !advanced => {
                    return Err(Skip::Unchanged);
                }
                TaskState::Queued | TaskState::Processing => {}
            }
            Ok(record.progress)
        })
        .await;

    match committed {
        None | Some(Err(Skip::NotTracking)) => Some(PollOutcome::Detached),
        Some(Err(Skip::Unchanged)) => None,
        Some(Ok(progress)) => match state {
            TaskState::Completed { result_url } => {
                tracing::info!(job_id = %job_id, task_id = %handle, "Job completed");
                ctx.events.publish(JobEvent::Completed { job_id, result_url });
                Some(PollOutcome::Completed)
            }
            TaskState::Failed { error } => {
                tracing::warn!(job_id = %job_id, task_id = %handle, error = %error, "Job failed");
                ctx.events.publish(JobEvent::Failed { job_id, error });
                Some(PollOutcome::Failed)
            }
            TaskState::Queued | TaskState::Processing => {
                tracing::debug!(job_id = %job_id, progress, "Job progress");
                None
            }
        },
    }
}

async fn time_out(ctx: &TaskContext, job_id: JobId, handle: &TaskHandle) -> PollOutcome {
    let committed = ctx
        .registry
        .try_modify(job_id, |record| {
            if !record.is_tracking(handle) {
                return Err(());
            }
            record.fail(POLL_TIMEOUT_MESSAGE).map_err(|_| ())
        })
        .await;

    match committed {
        Some(Ok(())) => {
            tracing::warn!(
                job_id = %job_id,
                task_id = %handle,
                timeout_secs = ctx.config.poll_timeout.as_secs(),
                "Gave up waiting for job",
            );
            ctx.events.publish(JobEvent::Failed {
                job_id,
                error: POLL_TIMEOUT_MESSAGE.to_string(),
            });
            PollOutcome::TimedOut
        }
        _ => PollOutcome::Detached,
    }
}
