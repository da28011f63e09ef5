//! Single-frame preview requests.
//!
//! A preview is one synchronous request/response exchange and never
//! touches the full-processing status. Each request carries the
//! sequence number issued by [`JobRecord::begin_preview`]; only the
//! answer to the newest request is applied, older ones are dropped.
//!
//! [`JobRecord::begin_preview`]: veditor_core::job::JobRecord::begin_preview

use tokio_util::sync::CancellationToken;
use veditor_core::job::CompositeRequest;
use veditor_core::types::JobId;
use veditor_events::JobEvent;

use crate::orchestrator::TaskContext;

/// Run one preview request and write its answer back if it is still wanted.
pub(crate) async fn run_preview(
    ctx: &TaskContext,
    job_id: JobId,
    seq: u64,
    request: CompositeRequest,
    cancel: &CancellationToken,
) {
    let result = tokio::select! {
        _ = cancel.cancelled() => {
            tracing::debug!(job_id = %job_id, seq, "Preview request superseded");
            return;
        }
        result = ctx.service.submit_preview(&request) => result,
    };

    match result {
        Ok(preview_url) => {
            let applied = ctx
                .registry
                .try_modify(job_id, |record| {
                    if record.apply_preview(seq, preview_url.clone()) {
                        Ok(())
                    } else {
                        Err(())
                    }
                })
                .await;
            match applied {
                Some(Ok(())) => {
                    tracing::info!(job_id = %job_id, seq, preview_url = %preview_url, "Preview ready");
                    ctx.events.publish(JobEvent::PreviewReady {
                        job_id,
                        preview_url,
                    });
                }
                Some(Err(())) => discard(ctx, job_id, seq),
                None => {}
            }
        }
        Err(e) => {
            let error = e.to_string();
            let abandoned = ctx
                .registry
                .try_modify(job_id, |record| {
                    if record.abandon_preview(seq) {
                        Ok(())
                    } else {
                        Err(())
                    }
                })
                .await;
            match abandoned {
                Some(Ok(())) => {
                    tracing::warn!(job_id = %job_id, seq, error = %error, "Preview failed");
                    ctx.events.publish(JobEvent::PreviewFailed { job_id, error });
                }
                Some(Err(())) => discard(ctx, job_id, seq),
                None => {}
            }
        }
    }
}

fn discard(ctx: &TaskContext, job_id: JobId, seq: u64) {
    tracing::debug!(job_id = %job_id, seq, "Dropping stale preview response");
    ctx.events.publish(JobEvent::PreviewDiscarded { job_id, seq });
}
