//! Media files attached to a job: the source video and an optional
//! background image.
//!
//! A [`MediaFile`] is immutable once built. Jobs hold it behind an `Arc`
//! so registry snapshots can be cloned without copying the payload.

use std::path::Path;
use std::sync::Arc;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Accepted formats
// ---------------------------------------------------------------------------

/// Video extensions accepted by the upload picker.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi"];

/// Image extensions accepted as a replacement background.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// What a media file is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    BackgroundImage,
}

impl MediaKind {
    fn allowed_extensions(self) -> &'static [&'static str] {
        match self {
            MediaKind::Video => VIDEO_EXTENSIONS,
            MediaKind::BackgroundImage => IMAGE_EXTENSIONS,
        }
    }

    fn label(self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::BackgroundImage => "background image",
        }
    }
}

// ---------------------------------------------------------------------------
// MediaFile
// ---------------------------------------------------------------------------

/// An uploaded file held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    file_name: String,
    content_type: String,
    data: Arc<Vec<u8>>,
}

impl MediaFile {
    /// Build a media file from in-memory bytes, checking its extension.
    pub fn from_bytes(
        kind: MediaKind,
        file_name: impl Into<String>,
        data: Vec<u8>,
    ) -> Result<Self, CoreError> {
        let file_name = file_name.into();
        let ext = validate_extension(kind, &file_name)?;
        Ok(Self {
            content_type: content_type_for(&ext).to_string(),
            file_name,
            data: Arc::new(data),
        })
    }

    /// Read a media file from disk.
    pub async fn load(kind: MediaKind, path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                CoreError::Validation(format!("Path {} has no file name", path.display()))
            })?
            .to_string();
        // Check the extension before paying for the read.
        validate_extension(kind, &file_name)?;
        let data = tokio::fs::read(path).await?;
        Self::from_bytes(kind, file_name, data)
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Validate that `file_name` carries an extension allowed for `kind`.
///
/// Returns the lower-cased extension on success.
pub fn validate_extension(kind: MediaKind, file_name: &str) -> Result<String, CoreError> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let allowed = kind.allowed_extensions();
    if allowed.contains(&ext.as_str()) {
        Ok(ext)
    } else {
        Err(CoreError::Validation(format!(
            "'{file_name}' is not a supported {}. Must be one of: {}",
            kind.label(),
            allowed.join(", ")
        )))
    }
}

fn content_type_for(ext: &str) -> &'static str {
    match ext {
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        _ => "application/octet-stream",
    }
}
