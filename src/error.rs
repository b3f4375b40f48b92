//! Error types for the vanish library.
//!
//! Three stage errors mirror the three places a session can go wrong:
//!
//! * [`IngestError`] — the candidate file was rejected (wrong type, too
//!   large, unreadable). Recovered locally: the session keeps whatever it
//!   held before the attempt.
//!
//! * [`TransformError`] — the remote service call failed. The session moves
//!   to `Failed("processing failed")` and the trigger becomes actionable
//!   again.
//!
//! * [`CodecError`] — bytes could not be turned into (or back out of) a
//!   data URL. Fatal to the current attempt only.
//!
//! [`VanishError`] wraps all three for the top-level entry points and adds
//! the errors that belong to no single stage (export, configuration).

use std::path::PathBuf;
use thiserror::Error;

/// The user-facing reason stored in `Failed(..)` for every remote or codec
/// failure. The remote service's own error payload is never surfaced.
pub const PROCESSING_FAILED: &str = "processing failed";

/// All errors returned by the vanish library entry points.
#[derive(Debug, Error)]
pub enum VanishError {
    // ── Stage errors ──────────────────────────────────────────────────────
    /// The candidate file was rejected during ingestion.
    #[error(transparent)]
    Validation(#[from] IngestError),

    /// The remote transform call failed.
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// Binary ↔ data URL conversion failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    // ── Session errors ────────────────────────────────────────────────────
    /// Download was requested before a processed image exists.
    #[error("Nothing to download: no processed image (session is {state})")]
    NothingToDownload { state: String },

    /// Transform was requested in a state where the trigger is inert.
    #[error("Cannot start processing while session is {state}")]
    NotActionable { state: String },

    /// A pending ingestion was replaced by a newer file or a reset before
    /// its preview was ready.
    #[error("Ingestion superseded by a newer file or a reset")]
    Superseded,

    /// The session driver task has stopped.
    #[error("Session driver has shut down")]
    SessionClosed,

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the exported image.
    #[error("Failed to write output file '{path}': {source}")]
    ExportFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Why a candidate file was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
    /// An ingestion event carried no file.
    #[error("No file provided")]
    NoFile,

    /// More than one file was dropped at once.
    #[error("Only one file can be processed at a time (got {count})")]
    TooManyFiles { count: usize },

    /// The file exceeds the configured size limit.
    #[error("File is too large: {size} bytes (max. {limit} bytes)")]
    FileTooLarge { size: u64, limit: u64 },

    /// The file is not a PNG or JPEG image.
    #[error("Unsupported file type '{found}'. Supported: PNG, JPG or JPEG")]
    UnsupportedType { found: String },

    /// The file could not be read from disk.
    #[error("Cannot read '{path}': {reason}")]
    Unreadable { path: PathBuf, reason: String },
}

/// Failure of a single remote transform attempt.
///
/// The `Display` output carries the detail for logs; callers show users
/// [`PROCESSING_FAILED`] instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    /// The request never produced a response (DNS, TLS, connection reset…).
    #[error("Request to transform service failed: {reason}")]
    Request { reason: String },

    /// The service answered with a non-2xx status.
    #[error("Transform service returned HTTP {status}")]
    Status { status: u16 },

    /// The service answered 2xx but with no body.
    #[error("Transform service returned an empty body")]
    EmptyBody,

    /// The response body could not be read to completion.
    #[error("Failed to read transform response: {reason}")]
    Body { reason: String },
}

/// Failure converting between raw bytes and a data URL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The source stream failed before all bytes were read.
    #[error("Failed to read image data: {reason}")]
    Read { reason: String },

    /// The text is not a `data:<mime>;base64,<payload>` URL.
    #[error("Malformed data URL: {detail}")]
    Malformed { detail: String },

    /// The payload is not valid base64.
    #[error("Invalid base64 payload: {0}")]
    Base64(String),
}

impl From<base64::DecodeError> for CodecError {
    fn from(e: base64::DecodeError) -> Self {
        CodecError::Base64(e.to_string())
    }
}
