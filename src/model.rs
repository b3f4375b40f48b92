//! Session data model: the images a session holds and the state it is in.

use crate::pipeline::encode::DataUrl;
use serde::{Deserialize, Serialize};
use std::fmt;

// ── Media types ──────────────────────────────────────────────────────────

/// Image formats accepted for upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Png,
    Jpeg,
}

impl MediaType {
    /// Canonical MIME string.
    pub fn mime(self) -> &'static str {
        match self {
            MediaType::Png => "image/png",
            MediaType::Jpeg => "image/jpeg",
        }
    }

    /// Parse a MIME string. `image/jpg` is accepted as an alias because
    /// some platforms report it.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or_default().trim();
        match essence.to_ascii_lowercase().as_str() {
            "image/png" => Some(MediaType::Png),
            "image/jpeg" | "image/jpg" => Some(MediaType::Jpeg),
            _ => None,
        }
    }

    /// Map a file extension (without the dot, any case).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(MediaType::Png),
            "jpg" | "jpeg" => Some(MediaType::Jpeg),
            _ => None,
        }
    }

    /// Map a format detected by `image::guess_format`.
    pub fn from_image_format(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Png => Some(MediaType::Png),
            image::ImageFormat::Jpeg => Some(MediaType::Jpeg),
            _ => None,
        }
    }

    /// Preferred file extension.
    pub fn extension(self) -> &'static str {
        match self {
            MediaType::Png => "png",
            MediaType::Jpeg => "jpg",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

// ── Images ───────────────────────────────────────────────────────────────

/// The original user-provided image, validated.
#[derive(Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub media_type: MediaType,
    pub bytes: Vec<u8>,
}

impl SourceFile {
    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

impl fmt::Debug for SourceFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceFile")
            .field("name", &self.name)
            .field("media_type", &self.media_type)
            .field("size", &self.bytes.len())
            .finish()
    }
}

/// Renderable encoding of the [`SourceFile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewImage(pub DataUrl);

/// Renderable encoding of the bytes returned by the transform service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedImage(pub DataUrl);

impl PreviewImage {
    pub fn data_url(&self) -> &DataUrl {
        &self.0
    }
}

impl ProcessedImage {
    pub fn data_url(&self) -> &DataUrl {
        &self.0
    }
}

// ── State ────────────────────────────────────────────────────────────────

/// Where a session is in its linear flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason")]
pub enum PipelineState {
    /// No source file.
    Empty,
    /// Source file and preview are available; processing can start.
    Ready,
    /// A remote call is outstanding.
    Processing,
    /// A processed image is available.
    Completed,
    /// The last remote call failed; processing can be re-triggered.
    Failed(String),
}

impl PipelineState {
    /// Whether the transform trigger is actionable.
    pub fn can_transform(&self) -> bool {
        matches!(self, PipelineState::Ready | PipelineState::Failed(_))
    }

    /// Short name without the failure reason.
    pub fn name(&self) -> &'static str {
        match self {
            PipelineState::Empty => "Empty",
            PipelineState::Ready => "Ready",
            PipelineState::Processing => "Processing",
            PipelineState::Completed => "Completed",
            PipelineState::Failed(_) => "Failed",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Failed(reason) => write!(f, "Failed({reason})"),
            other => f.write_str(other.name()),
        }
    }
}

/// Tag identifying which source file an asynchronous result belongs to.
///
/// Bumped on every accepted ingestion and on every reset, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Generation(pub u64);

impl Generation {
    pub(crate) fn next(self) -> Self {
        Generation(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Serialisable view of a session, without the image payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub state: PipelineState,
    pub generation: Generation,
    pub source_name: Option<String>,
    pub source_type: Option<MediaType>,
    pub source_size: Option<u64>,
    pub has_preview: bool,
    pub has_processed: bool,
    pub processed_size: Option<u64>,
    pub error: Option<String>,
}
