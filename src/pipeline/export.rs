//! Export: hand the processed image to the platform as a named file.
//!
//! The session never touches the file system itself; it calls an
//! [`Exporter`]. [`DirectoryExporter`] is the desktop implementation.

use crate::error::VanishError;
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Where an export ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    pub file_name: String,
    /// Full path, for exporters that write to disk.
    pub path: Option<PathBuf>,
    pub bytes: usize,
}

/// Saves bytes under a file name.
#[async_trait]
pub trait Exporter: Send + Sync {
    async fn export(&self, file_name: &str, bytes: &[u8]) -> Result<ExportedFile, VanishError>;
}

/// Writes exports into a directory, atomically.
///
/// Bytes go to a temp file in the target directory first and are renamed
/// into place, so a reader never sees a half-written image.
#[derive(Debug, Clone)]
pub struct DirectoryExporter {
    dir: PathBuf,
}

impl DirectoryExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl Exporter for DirectoryExporter {
    async fn export(&self, file_name: &str, bytes: &[u8]) -> Result<ExportedFile, VanishError> {
        let path = self.dir.join(file_name);
        let write_failed = |source: std::io::Error| VanishError::ExportFailed {
            path: path.clone(),
            source,
        };

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(write_failed)?;

        let dir = self.dir.clone();
        let target = path.clone();
        let data = bytes.to_vec();
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut tmp = NamedTempFile::new_in(&dir)?;
            tmp.write_all(&data)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&target).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| VanishError::Internal(format!("export task panicked: {e}")))?
        .map_err(write_failed)?;

        debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        info!("Saved {}", path.display());
        Ok(ExportedFile {
            file_name: file_name.to_string(),
            path: Some(path),
            bytes: bytes.len(),
        })
    }
}
