//! REST client for the compositing service endpoints.
//!
//! Wraps job submission, status polling, preview rendering and result
//! download using [`reqwest`]. Uploads are `multipart/form-data`;
//! responses are JSON.

use std::path::Path;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::Url;
use tokio::io::AsyncWriteExt;
use veditor_core::effects::normalized_lighting;
use veditor_core::job::CompositeRequest;
use veditor_core::media::MediaFile;
use veditor_core::types::TaskHandle;

use crate::config::CompositorConfig;
use crate::error::CompositorError;
use crate::messages::{error_detail, PreviewResponse, StatusResponse, SubmitResponse, TaskStatus};
use crate::service::CompositingService;

/// HTTP client for one compositing service origin.
pub struct CompositingApi {
    client: reqwest::Client,
    base_url: String,
    output_dir: Option<String>,
}

impl CompositingApi {
    /// Create a client with its own connection pool.
    pub fn new(config: &CompositorConfig) -> Result<Self, CompositorError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self::with_client(client, config))
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, config: &CompositorConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.clone(),
            output_dir: config.output_dir.clone(),
        }
    }

    /// Base origin requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve a server-relative path (e.g. `/download/out.mp4`) against
    /// the service origin. Absolute URLs are returned unchanged.
    pub fn resolve_url(&self, path: &str) -> String {
        match Url::parse(&self.base_url).and_then(|base| base.join(path)) {
            Ok(url) => url.to_string(),
            Err(_) => format!("{}/{}", self.base_url, path.trim_start_matches('/')),
        }
    }

    /// Download a finished result to `dest`, streaming the body to disk.
    ///
    /// Returns the number of bytes written.
    pub async fn download(&self, url: &str, dest: &Path) -> Result<u64, CompositorError> {
        let response = self
            .client
            .get(self.resolve_url(url))
            .send()
            .await
            .map_err(|e| CompositorError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompositorError::Transport(format!(
                "download returned {}: {}",
                status.as_u16(),
                error_detail(&body)
            )));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| CompositorError::Transport(e.to_string()))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        tracing::info!(url, dest = %dest.display(), bytes = written, "Downloaded result");
        Ok(written)
    }

    // ---- private helpers ----

    /// Build the multipart form shared by submission and preview.
    fn build_form(
        &self,
        request: &CompositeRequest,
        include_output_dir: bool,
    ) -> Result<Form, CompositorError> {
        let mut form = Form::new()
            .part("video", file_part(&request.video)?)
            .text("color_r", request.color.r.to_string())
            .text("color_g", request.color.g.to_string())
            .text("color_b", request.color.b.to_string())
            .text("blur_radius", request.blur_radius.to_string())
            .text(
                "lighting_strength",
                normalized_lighting(request.lighting_strength).to_string(),
            );

        if let Some(background) = &request.background {
            form = form.part("background", file_part(background)?);
        }
        if include_output_dir {
            if let Some(dir) = &self.output_dir {
                form = form.text("output_dir", dir.clone());
            }
        }
        Ok(form)
    }
}

#[async_trait]
impl CompositingService for CompositingApi {
    async fn submit_job(&self, request: &CompositeRequest) -> Result<TaskHandle, CompositorError> {
        let form = self.build_form(request, true)?;

        let response = self
            .client
            .post(format!("{}/remove-background", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| CompositorError::Submission {
                status: None,
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompositorError::Submission {
                status: Some(status.as_u16()),
                message: format!("service returned {}: {}", status.as_u16(), error_detail(&body)),
            });
        }

        let parsed: SubmitResponse = response
            .json()
            .await
            .map_err(|e| CompositorError::InvalidResponse(e.to_string()))?;
        if parsed.task_id.trim().is_empty() {
            return Err(CompositorError::InvalidResponse(
                "submission response has an empty task_id".to_string(),
            ));
        }

        tracing::info!(
            job_id = %request.job_id,
            task_id = %parsed.task_id,
            "Job accepted by compositing service",
        );
        Ok(TaskHandle::new(parsed.task_id))
    }

    async fn get_status(&self, handle: &TaskHandle) -> Result<TaskStatus, CompositorError> {
        let response = self
            .client
            .get(format!("{}/status/{}", self.base_url, handle))
            .send()
            .await
            .map_err(|e| CompositorError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompositorError::Transport(format!(
                "status endpoint returned {}: {}",
                status.as_u16(),
                error_detail(&body)
            )));
        }

        let parsed: StatusResponse = response
            .json()
            .await
            .map_err(|e| CompositorError::InvalidResponse(e.to_string()))?;
        Ok(parsed.into_status(|path| self.resolve_url(path)))
    }

    async fn submit_preview(&self, request: &CompositeRequest) -> Result<String, CompositorError> {
        let form = self.build_form(request, false)?;

        let response = self
            .client
            .post(format!("{}/preview", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| CompositorError::Preview {
                status: None,
                detail: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompositorError::Preview {
                status: Some(status.as_u16()),
                detail: error_detail(&body),
            });
        }

        let parsed: PreviewResponse = response.json().await.map_err(|e| {
            CompositorError::Preview {
                status: Some(status.as_u16()),
                detail: format!("unreadable preview response: {e}"),
            }
        })?;
        Ok(self.resolve_url(&parsed.preview_url))
    }
}

fn file_part(file: &MediaFile) -> Result<Part, CompositorError> {
    Ok(Part::bytes(file.bytes().to_vec())
        .file_name(file.file_name().to_string())
        .mime_str(file.content_type())?)
}
