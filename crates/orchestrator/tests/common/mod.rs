#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use veditor_compositor::messages::{TaskState, TaskStatus};
use veditor_compositor::{CompositingService, CompositorError};
use veditor_core::job::{CompositeRequest, JobRecord};
use veditor_core::media::{MediaFile, MediaKind};
use veditor_core::types::{JobId, TaskHandle};
use veditor_orchestrator::{JobOrchestrator, OrchestratorConfig};

/// One scripted answer of the status endpoint.
#[derive(Debug, Clone)]
pub enum Reply {
    Queued,
    Progress(i64),
    Done(&'static str),
    Failed(&'static str),
    /// The status request itself fails.
    Unreachable,
}

/// In-memory stand-in for the compositing service.
///
/// Status answers are scripted per video file name and consumed in order;
/// the last answer repeats forever. Task handles look like `clip.mp4#2`
/// (second submission of `clip.mp4`).
#[derive(Default)]
pub struct FakeService {
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    rejected: Mutex<HashSet<String>>,
    submit_delay: Mutex<Duration>,
    preview_delays: Mutex<VecDeque<Duration>>,
    preview_error: Mutex<Option<String>>,

    submissions: Mutex<Vec<CompositeRequest>>,
    previews: Mutex<Vec<CompositeRequest>>,
    status_calls: Mutex<HashMap<String, usize>>,
    handle_counter: AtomicUsize,
    uploads_in_flight: AtomicUsize,
    max_uploads_in_flight: AtomicUsize,
}

impl FakeService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, video: &str, replies: impl IntoIterator<Item = Reply>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(video.to_string(), replies.into_iter().collect());
    }

    pub fn reject(&self, video: &str) {
        self.rejected.lock().unwrap().insert(video.to_string());
    }

    pub fn set_submit_delay(&self, delay: Duration) {
        *self.submit_delay.lock().unwrap() = delay;
    }

    pub fn push_preview_delay(&self, delay: Duration) {
        self.preview_delays.lock().unwrap().push_back(delay);
    }

    pub fn fail_previews(&self, detail: &str) {
        *self.preview_error.lock().unwrap() = Some(detail.to_string());
    }

    pub fn submissions(&self) -> Vec<CompositeRequest> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn previews(&self) -> Vec<CompositeRequest> {
        self.previews.lock().unwrap().clone()
    }

    /// Status requests made for all tasks of `video`.
    pub fn status_calls(&self, video: &str) -> usize {
        self.status_calls
            .lock()
            .unwrap()
            .get(video)
            .copied()
            .unwrap_or(0)
    }

    pub fn max_uploads_in_flight(&self) -> usize {
        self.max_uploads_in_flight.load(Ordering::SeqCst)
    }

    fn next_reply(&self, video: &str) -> Reply {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(video) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(Reply::Queued),
            Some(queue) => queue.front().cloned().unwrap_or(Reply::Queued),
            None => Reply::Queued,
        }
    }
}

#[async_trait]
impl CompositingService for FakeService {
    async fn submit_job(&self, request: &CompositeRequest) -> Result<TaskHandle, CompositorError> {
        let now = self.uploads_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_uploads_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.submit_delay.lock().unwrap();
        tokio::time::sleep(delay).await;
        self.uploads_in_flight.fetch_sub(1, Ordering::SeqCst);

        self.submissions.lock().unwrap().push(request.clone());
        let video = request.video.file_name().to_string();
        if self.rejected.lock().unwrap().contains(&video) {
            return Err(CompositorError::Submission {
                status: Some(500),
                message: "service returned 500: GPU busy".into(),
            });
        }

        let n = self.handle_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TaskHandle::new(format!("{video}#{n}")))
    }

    async fn get_status(&self, handle: &TaskHandle) -> Result<TaskStatus, CompositorError> {
        let video = handle
            .as_str()
            .split('#')
            .next()
            .unwrap_or_default()
            .to_string();
        *self
            .status_calls
            .lock()
            .unwrap()
            .entry(video.clone())
            .or_default() += 1;

        fn status(state: TaskState, progress: i64) -> Result<TaskStatus, CompositorError> {
            Ok(TaskStatus { state, progress })
        }

        match self.next_reply(&video) {
            Reply::Queued => status(TaskState::Queued, 0),
            Reply::Progress(p) => status(TaskState::Processing, p),
            Reply::Done(url) => status(
                TaskState::Completed {
                    result_url: Some(url.to_string()),
                },
                100,
            ),
            Reply::Failed(error) => status(
                TaskState::Failed {
                    error: error.to_string(),
                },
                0,
            ),
            Reply::Unreachable => Err(CompositorError::Transport("connection refused".into())),
        }
    }

    async fn submit_preview(&self, request: &CompositeRequest) -> Result<String, CompositorError> {
        self.previews.lock().unwrap().push(request.clone());
        let delay = self
            .preview_delays
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default();
        tokio::time::sleep(delay).await;

        if let Some(detail) = self.preview_error.lock().unwrap().clone() {
            return Err(CompositorError::Preview {
                status: Some(400),
                detail,
            });
        }
        Ok(format!(
            "http://svc/previews/{}-{}.png",
            request.video.file_name(),
            request.lighting_strength
        ))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn video(name: &str) -> MediaFile {
    MediaFile::from_bytes(MediaKind::Video, name, b"FAKE".to_vec()).unwrap()
}

pub fn test_config() -> OrchestratorConfig {
    OrchestratorConfig {
        poll_interval: Duration::from_secs(1),
        poll_timeout: Duration::from_secs(30 * 60),
        max_concurrent_submissions: 4,
    }
}

pub fn orchestrator(service: &Arc<FakeService>) -> Arc<JobOrchestrator> {
    orchestrator_with(service, test_config())
}

pub fn orchestrator_with(
    service: &Arc<FakeService>,
    config: OrchestratorConfig,
) -> Arc<JobOrchestrator> {
    JobOrchestrator::new(Arc::clone(service) as Arc<dyn CompositingService>, config)
}

/// Wait (in virtual time) until the record satisfies `done`.
pub async fn wait_for(
    orchestrator: &JobOrchestrator,
    id: JobId,
    done: impl Fn(&JobRecord) -> bool,
) -> JobRecord {
    for _ in 0..1200 {
        if let Some(record) = orchestrator.get(id).await {
            if done(&record) {
                return record;
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("job {id} never reached the expected state");
}
