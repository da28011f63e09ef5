//! One command-line run: queue the videos, apply the effects, optionally
//! preview, process everything, and report.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::broadcast::error::RecvError;
use veditor_compositor::{CompositingApi, CompositingService};
use veditor_core::job::{JobRecord, JobStatus};
use veditor_core::types::JobId;
use veditor_events::JobEvent;
use veditor_orchestrator::JobOrchestrator;

use crate::cli::Cli;

/// What happened to the queued videos.
#[derive(Debug, Default)]
pub struct Summary {
    pub completed: usize,
    pub failed: usize,
    /// Submissions the service refused or never received.
    pub rejected: usize,
    pub downloaded: usize,
}

impl Summary {
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.rejected == 0
    }
}

/// Run the whole session described by `cli`.
pub async fn run(cli: Cli) -> anyhow::Result<Summary> {
    let compositor_config = cli.compositor_config();
    let api = Arc::new(
        CompositingApi::new(&compositor_config).context("failed to build the HTTP client")?,
    );
    tracing::info!(service_url = %api.base_url(), "Using compositing service");

    let orchestrator = JobOrchestrator::new(
        Arc::clone(&api) as Arc<dyn CompositingService>,
        cli.orchestrator_config(),
    );

    let result = drive(&cli, &api, &orchestrator).await;
    orchestrator.shutdown().await;
    result
}

// ---- private helpers ----

async fn drive(
    cli: &Cli,
    api: &CompositingApi,
    orchestrator: &JobOrchestrator,
) -> anyhow::Result<Summary> {
    let edits = cli.edits().await?;
    let ids = orchestrator
        .insert_paths(cli.videos.as_slice(), true)
        .await
        .context("failed to queue videos")?;

    for id in &ids {
        for edit in &edits {
            orchestrator.edit(*id, edit.clone()).await?;
        }
    }

    let mut events = orchestrator.subscribe();

    if cli.preview {
        for id in &ids {
            orchestrator.request_preview(*id).await?;
        }
        let pending: HashSet<JobId> = ids.iter().copied().collect();
        wait_until(orchestrator, &mut events, &pending, |r| !r.preview_pending).await?;
        report_previews(orchestrator, &ids).await;
        if cli.preview_only {
            return Ok(Summary::default());
        }
    }

    let started: HashSet<JobId> = orchestrator.submit_all_idle().await.into_iter().collect();
    println!("Submitted {} video(s) for processing", started.len());
    wait_until(orchestrator, &mut events, &started, |r| !r.status.is_active()).await?;

    let mut summary = Summary::default();
    let snapshot = orchestrator.snapshot().await;
    for record in snapshot.records().filter(|r| started.contains(&r.id)) {
        let name = record.source.file_name();
        match record.status {
            JobStatus::Completed => {
                summary.completed += 1;
                println!("  done    {name}  {}", record.result_url.as_deref().unwrap_or("-"));
                if let (Some(dir), Some(url)) = (&cli.download, &record.result_url) {
                    match download(api, dir, record, url).await {
                        Ok(()) => summary.downloaded += 1,
                        Err(e) => {
                            tracing::error!(job_id = %record.id, error = %e, "Download failed");
                        }
                    }
                }
            }
            JobStatus::Failed => {
                summary.failed += 1;
                println!("  failed  {name}  {}", record.last_error.as_deref().unwrap_or("-"));
            }
            JobStatus::Idle => {
                summary.rejected += 1;
                println!("  refused {name}  {}", record.last_error.as_deref().unwrap_or("-"));
            }
            JobStatus::Submitting | JobStatus::Processing => {}
        }
    }

    Ok(summary)
}

/// Render progress events until every record in `ids` satisfies `settled`
/// (or was removed). Ctrl-C cancels the remaining jobs.
async fn wait_until(
    orchestrator: &JobOrchestrator,
    events: &mut tokio::sync::broadcast::Receiver<JobEvent>,
    ids: &HashSet<JobId>,
    settled: impl Fn(&JobRecord) -> bool,
) -> anyhow::Result<()> {
    loop {
        let snapshot = orchestrator.snapshot().await;
        let done = ids
            .iter()
            .all(|id| snapshot.get(*id).map_or(true, &settled));
        if done {
            return Ok(());
        }

        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => render(orchestrator, &event).await,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event stream lagged; re-reading queue");
                }
                Err(RecvError::Closed) => return Ok(()),
            },
            _ = tokio::signal::ctrl_c() => {
                println!("Interrupted, cancelling remaining jobs");
                for id in ids {
                    // Jobs that already settled reject the cancel; that is fine.
                    let _ = orchestrator.cancel(*id).await;
                }
                anyhow::bail!("interrupted");
            }
        }
    }
}

async fn render(orchestrator: &JobOrchestrator, event: &JobEvent) {
    let Some(id) = event.job_id() else { return };
    let name = match orchestrator.get(id).await {
        Some(record) => record.source.file_name().to_string(),
        None => id.to_string(),
    };
    match event {
        JobEvent::Updated {
            status: JobStatus::Processing,
            progress,
            ..
        } => println!("  {name}: {progress}%"),
        JobEvent::SubmissionFailed { error, .. } => println!("  {name}: submission failed: {error}"),
        JobEvent::PreviewFailed { error, .. } => println!("  {name}: preview failed: {error}"),
        _ => tracing::debug!(event = event.event_type(), job_id = %id, "Job event"),
    }
}

async fn report_previews(orchestrator: &JobOrchestrator, ids: &[JobId]) {
    for id in ids {
        if let Some(record) = orchestrator.get(*id).await {
            println!(
                "  preview {}  {}",
                record.source.file_name(),
                record.preview_url.as_deref().unwrap_or("-")
            );
        }
    }
}

async fn download(
    api: &CompositingApi,
    dir: &Path,
    record: &JobRecord,
    url: &str,
) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("cannot create {}", dir.display()))?;

    let dest = dir.join(result_file_name(record, url));
    let bytes = api.download(url, &dest).await?;
    println!("  saved   {} ({bytes} bytes)", dest.display());
    Ok(())
}

/// Name of the downloaded file: the last URL segment, or one derived from
/// the source video when the URL has none.
fn result_file_name(record: &JobRecord, url: &str) -> String {
    let last = url
        .split(['?', '#'])
        .next()
        .unwrap_or(url)
        .rsplit('/')
        .next()
        .unwrap_or_default();
    if last.is_empty() {
        format!("composited_{}", record.source.file_name())
    } else {
        last.to_string()
    }
}

#[cfg(test)]
mod tests {
    use veditor_core::media::{MediaFile, MediaKind};

    use super::*;

    fn record() -> JobRecord {
        JobRecord::new(MediaFile::from_bytes(MediaKind::Video, "clip.mp4", vec![1]).unwrap())
    }

    #[test]
    fn result_file_name_uses_last_url_segment() {
        assert_eq!(
            result_file_name(&record(), "http://svc/download/out_7.mp4?token=x"),
            "out_7.mp4"
        );
    }

    #[test]
    fn result_file_name_falls_back_to_source_name() {
        assert_eq!(result_file_name(&record(), "http://svc/download/"), "composited_clip.mp4");
    }

    #[test]
    fn summary_success_requires_no_failures() {
        let mut summary = Summary {
            completed: 2,
            ..Default::default()
        };
        assert!(summary.is_success());
        summary.rejected = 1;
        assert!(!summary.is_success());
    }
}
