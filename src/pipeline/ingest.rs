//! File ingestion: turn a dropped or selected file into a [`SourceFile`].
//!
//! A file is accepted on its declared type and its size alone. The magic
//! bytes are only sniffed for a debug note. Nothing here touches session
//! state; the orchestrator only commits a [`SourceFile`] once it has passed
//! both checks.

use crate::error::IngestError;
use crate::model::{MediaType, SourceFile};
use std::path::Path;
use tracing::debug;

/// A file offered for ingestion, not yet validated.
#[derive(Clone)]
pub struct Candidate {
    /// File name as the user sees it.
    pub name: String,
    /// MIME type reported by the platform, if any. When absent the file
    /// extension decides.
    pub declared_mime: Option<String>,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for Candidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Candidate")
            .field("name", &self.name)
            .field("declared_mime", &self.declared_mime)
            .field("size", &self.bytes.len())
            .finish()
    }
}

impl Candidate {
    pub fn from_bytes(
        name: impl Into<String>,
        declared_mime: Option<&str>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            name: name.into(),
            declared_mime: declared_mime.map(str::to_string),
            bytes: bytes.into(),
        }
    }

    /// Load a candidate from disk.
    ///
    /// The size limit is checked against file metadata before reading, so
    /// an oversized file is rejected without being loaded.
    pub async fn from_path(path: impl AsRef<Path>, max_bytes: u64) -> Result<Self, IngestError> {
        let path = path.as_ref();
        let unreadable = |reason: String| IngestError::Unreadable {
            path: path.to_path_buf(),
            reason,
        };

        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| unreadable(e.to_string()))?;
        if !meta.is_file() {
            return Err(unreadable("not a regular file".into()));
        }
        if meta.len() > max_bytes {
            return Err(IngestError::FileTooLarge {
                size: meta.len(),
                limit: max_bytes,
            });
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| unreadable(e.to_string()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        debug!("Loaded candidate '{}' ({} bytes)", name, bytes.len());
        Ok(Self {
            name,
            declared_mime: None,
            bytes,
        })
    }

    /// Type the platform claims the file has.
    fn declared_type(&self) -> Result<MediaType, IngestError> {
        match &self.declared_mime {
            Some(mime) => MediaType::from_mime(mime).ok_or_else(|| IngestError::UnsupportedType {
                found: mime.clone(),
            }),
            None => {
                let ext = Path::new(&self.name)
                    .extension()
                    .map(|e| e.to_string_lossy().into_owned())
                    .unwrap_or_default();
                MediaType::from_extension(&ext).ok_or_else(|| IngestError::UnsupportedType {
                    found: if ext.is_empty() {
                        "no extension".into()
                    } else {
                        format!(".{ext}")
                    },
                })
            }
        }
    }
}

/// Require exactly one file from a drop event.
pub fn single(mut candidates: Vec<Candidate>) -> Result<Candidate, IngestError> {
    match candidates.len() {
        0 => Err(IngestError::NoFile),
        1 => Ok(candidates.remove(0)),
        count => Err(IngestError::TooManyFiles { count }),
    }
}

/// Validate a candidate against the size limit and the PNG/JPEG whitelist.
pub fn validate(candidate: Candidate, max_bytes: u64) -> Result<SourceFile, IngestError> {
    let size = candidate.bytes.len() as u64;
    if size > max_bytes {
        return Err(IngestError::FileTooLarge {
            size,
            limit: max_bytes,
        });
    }

    let media_type = candidate.declared_type()?;

    match image::guess_format(&candidate.bytes)
        .ok()
        .and_then(MediaType::from_image_format)
    {
        Some(detected) if detected == media_type => {}
        detected => debug!(
            "'{}' declared as {} but content looks like {}",
            candidate.name,
            media_type,
            detected.map_or_else(|| "something else".to_string(), |t| t.to_string())
        ),
    }

    Ok(SourceFile {
        name: candidate.name,
        media_type,
        bytes: candidate.bytes,
    })
}
