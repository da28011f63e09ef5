//! Integration tests for `CompositingApi` against a mock HTTP server.
//!
//! Each test mounts the endpoints it needs on a fresh `wiremock` server
//! and checks both the outgoing multipart form and the mapping of the
//! service's answers onto `TaskStatus` / `CompositorError`.

use assert_matches::assert_matches;
use serde_json::json;
use veditor_compositor::messages::TaskState;
use veditor_compositor::{CompositingApi, CompositingService, CompositorConfig, CompositorError};
use veditor_core::effects::Rgb;
use veditor_core::job::{CompositeRequest, JobRecord};
use veditor_core::media::{MediaFile, MediaKind};
use veditor_core::types::TaskHandle;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn video() -> MediaFile {
    MediaFile::from_bytes(MediaKind::Video, "clip.mp4", b"FAKE-VIDEO-BYTES".to_vec()).unwrap()
}

fn request(lighting: u8) -> CompositeRequest {
    let mut record = JobRecord::new(video());
    record.set_background_color(Rgb::new(10, 20, 30));
    record.blur_radius = 25;
    record.lighting_strength = lighting;
    record.composite_request()
}

fn api_for(server: &MockServer) -> CompositingApi {
    CompositingApi::new(&CompositorConfig::with_base_url(server.uri())).unwrap()
}

/// Pull the value of a multipart field out of a raw request body.
fn form_field(body: &str, name: &str) -> Option<String> {
    let marker = format!("name=\"{name}\"");
    let start = body.find(&marker)?;
    let rest = &body[start..];
    let value_start = rest.find("\r\n\r\n")? + 4;
    let value = &rest[value_start..];
    let end = value.find("\r\n")?;
    Some(value[..end].to_string())
}

async fn last_body(server: &MockServer) -> String {
    let requests = server.received_requests().await.expect("recording enabled");
    let last = requests.last().expect("at least one request");
    String::from_utf8_lossy(&last.body).into_owned()
}

// ---------------------------------------------------------------------------
// Test: submission sends every form field with lighting normalized
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_job_sends_multipart_form() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/remove-background"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "task_id": "task-1" })))
        .expect(1)
        .mount(&server)
        .await;

    let config = CompositorConfig {
        output_dir: Some("renders/today".into()),
        ..CompositorConfig::with_base_url(server.uri())
    };
    let api = CompositingApi::new(&config).unwrap();

    let handle = api.submit_job(&request(50)).await.unwrap();
    assert_eq!(handle, TaskHandle::new("task-1"));

    let body = last_body(&server).await;
    assert_eq!(form_field(&body, "color_r").as_deref(), Some("10"));
    assert_eq!(form_field(&body, "color_g").as_deref(), Some("20"));
    assert_eq!(form_field(&body, "color_b").as_deref(), Some("30"));
    assert_eq!(form_field(&body, "blur_radius").as_deref(), Some("25"));
    assert_eq!(form_field(&body, "lighting_strength").as_deref(), Some("0.5"));
    assert_eq!(form_field(&body, "output_dir").as_deref(), Some("renders/today"));
    assert!(body.contains("filename=\"clip.mp4\""));
    assert!(body.contains("FAKE-VIDEO-BYTES"));
    assert!(!body.contains("name=\"background\""));
}

// ---------------------------------------------------------------------------
// Test: a background image is sent only when it is the active choice
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_job_includes_background_image_when_chosen() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/remove-background"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "task_id": "task-2" })))
        .mount(&server)
        .await;

    let mut record = JobRecord::new(video());
    record.set_background_image(
        MediaFile::from_bytes(MediaKind::BackgroundImage, "beach.png", b"PNGDATA".to_vec())
            .unwrap(),
    );

    api_for(&server)
        .submit_job(&record.composite_request())
        .await
        .unwrap();

    let body = last_body(&server).await;
    assert!(body.contains("name=\"background\"; filename=\"beach.png\""));
    assert!(body.contains("PNGDATA"));
}

// ---------------------------------------------------------------------------
// Test: a non-2xx submission maps to CompositorError::Submission
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_job_rejection_is_submission_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/remove-background"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({ "detail": "GPU busy" })))
        .mount(&server)
        .await;

    let err = api_for(&server).submit_job(&request(0)).await.unwrap_err();
    assert_matches!(
        err,
        CompositorError::Submission { status: Some(500), ref message } if message.contains("GPU busy")
    );
}

// ---------------------------------------------------------------------------
// Test: an unreachable service is also a submission error
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_job_to_unreachable_service_is_submission_error() {
    let api = CompositingApi::new(&CompositorConfig::with_base_url("http://127.0.0.1:1")).unwrap();
    let err = api.submit_job(&request(0)).await.unwrap_err();
    assert_matches!(err, CompositorError::Submission { status: None, .. });
}

// ---------------------------------------------------------------------------
// Test: status polling resolves output_url against the origin
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_status_completed_resolves_output_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status/task-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "completed",
            "progress": 100,
            "output_url": "/download/out_task-1.mp4"
        })))
        .mount(&server)
        .await;

    let status = api_for(&server)
        .get_status(&TaskHandle::new("task-1"))
        .await
        .unwrap();

    let expected = format!("{}/download/out_task-1.mp4", server.uri());
    assert_eq!(status.progress, 100);
    assert_matches!(status.state, TaskState::Completed { result_url: Some(ref url) } if *url == expected);
}

// ---------------------------------------------------------------------------
// Test: a reported job failure is a successful poll
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_status_reported_failure_is_ok() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status/task-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "failed",
            "progress": 35,
            "error": "Could not open video"
        })))
        .mount(&server)
        .await;

    let status = api_for(&server)
        .get_status(&TaskHandle::new("task-9"))
        .await
        .unwrap();
    assert_matches!(status.state, TaskState::Failed { ref error } if error == "Could not open video");
}

// ---------------------------------------------------------------------------
// Test: server errors and garbage on the status endpoint are transient
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_status_server_error_is_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status/task-1"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = api_for(&server)
        .get_status(&TaskHandle::new("task-1"))
        .await
        .unwrap_err();
    assert_matches!(err, CompositorError::Transport(_));
    assert!(err.is_transient());
}

#[tokio::test]
async fn get_status_malformed_body_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status/task-1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = api_for(&server)
        .get_status(&TaskHandle::new("task-1"))
        .await
        .unwrap_err();
    assert_matches!(err, CompositorError::InvalidResponse(_));
    assert!(err.is_transient());
}

// ---------------------------------------------------------------------------
// Test: preview
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_preview_returns_absolute_url_without_output_dir() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/preview"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "preview_url": "/previews/p1.png" })),
        )
        .mount(&server)
        .await;

    let config = CompositorConfig {
        output_dir: Some("renders".into()),
        ..CompositorConfig::with_base_url(server.uri())
    };
    let url = CompositingApi::new(&config)
        .unwrap()
        .submit_preview(&request(80))
        .await
        .unwrap();
    assert_eq!(url, format!("{}/previews/p1.png", server.uri()));

    let body = last_body(&server).await;
    assert_eq!(form_field(&body, "lighting_strength").as_deref(), Some("0.8"));
    assert!(form_field(&body, "output_dir").is_none());
}

#[tokio::test]
async fn submit_preview_failure_carries_detail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/preview"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "detail": "Video has no frames" })),
        )
        .mount(&server)
        .await;

    let err = api_for(&server)
        .submit_preview(&request(0))
        .await
        .unwrap_err();
    assert_matches!(
        err,
        CompositorError::Preview { status: Some(400), ref detail } if detail == "Video has no frames"
    );
}

// ---------------------------------------------------------------------------
// Test: download streams the result to disk
// ---------------------------------------------------------------------------

#[tokio::test]
async fn download_writes_result_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/download/out.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"RESULT".to_vec()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("out.mp4");
    let api = api_for(&server);

    let written = api.download("/download/out.mp4", &dest).await.unwrap();
    assert_eq!(written, 6);
    assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"RESULT");
}
