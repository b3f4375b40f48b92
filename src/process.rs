//! One-shot entry points: ingest → process → download for a single file.
//!
//! These drive a private [`Session`] straight through its happy path. Use
//! [`crate::driver::spawn`] instead when a UI needs to interleave actions.

use crate::config::VanishConfig;
use crate::error::VanishError;
use crate::model::SessionSnapshot;
use crate::pipeline::export::{DirectoryExporter, ExportedFile, Exporter};
use crate::pipeline::transform::{RemoveBgClient, Transformer};
use crate::session::Session;
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// What a one-shot run produced.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub exported: ExportedFile,
    pub snapshot: SessionSnapshot,
    pub duration_ms: u64,
}

/// Remove the background of the image at `input` and write the result
/// into `output_dir` under the configured export name.
///
/// # Errors
/// - [`VanishError::Validation`] if the file is not a PNG/JPEG ≤ the limit
/// - [`VanishError::Transform`] if the remote call fails
/// - [`VanishError::ExportFailed`] if the result cannot be written
pub async fn remove_background(
    input: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
    config: &VanishConfig,
) -> Result<ProcessOutput, VanishError> {
    let client = RemoveBgClient::new(config)?;
    let exporter = DirectoryExporter::new(output_dir.as_ref());
    remove_background_with(input, config, &client, &exporter).await
}

/// [`remove_background`] with caller-supplied capabilities.
pub async fn remove_background_with(
    input: impl AsRef<Path>,
    config: &VanishConfig,
    transformer: &dyn Transformer,
    exporter: &dyn Exporter,
) -> Result<ProcessOutput, VanishError> {
    let start = Instant::now();
    let input = input.as_ref();
    info!("Processing {}", input.display());

    let mut session = Session::new(config.clone());
    let candidate = session.load(input).await?;
    session.ingest(candidate).await?;
    session.transform(transformer).await?;
    let exported = session.download(exporter).await?;

    let duration_ms = start.elapsed().as_millis() as u64;
    info!("Done in {}ms", duration_ms);
    Ok(ProcessOutput {
        exported,
        snapshot: session.snapshot(),
        duration_ms,
    })
}

/// Synchronous wrapper around [`remove_background`].
///
/// Creates a temporary tokio runtime internally.
pub fn remove_background_sync(
    input: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
    config: &VanishConfig,
) -> Result<ProcessOutput, VanishError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| VanishError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(remove_background(input, output_dir, config))
}
