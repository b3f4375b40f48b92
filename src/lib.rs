//! # vanish
//!
//! Remove image backgrounds through a remote API: validate a PNG/JPEG,
//! preview it, send it to remove.bg (or a compatible endpoint), and export
//! the result.
//!
//! ## Pipeline Overview
//!
//! ```text
//! file
//!  │
//!  ├─ 1. Ingest     one PNG/JPEG, ≤ 10 MiB, magic bytes checked
//!  ├─ 2. Preview    bytes → data:image/…;base64,… URL
//!  ├─ 3. Transform  multipart POST (field `image_file`) → result bytes
//!  ├─ 4. Result     result bytes → data URL
//!  └─ 5. Download   data URL → `processed-image.png`
//! ```
//!
//! A [`Session`] sequences these steps through a small state machine
//! (`Empty → Ready → Processing → Completed | Failed`) and drops remote
//! results that arrive after the user has moved on. [`driver::spawn`] runs a
//! session as an event loop for interactive front ends.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vanish::{remove_background, VanishConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = VanishConfig::builder()
//!         .api_key(std::env::var("REMOVE_BG_API_KEY")?)
//!         .build()?;
//!     let out = remove_background("photo.jpg", ".", &config).await?;
//!     eprintln!("wrote {:?}", out.exported.path);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `vanish` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod driver;
pub mod error;
pub mod model;
pub mod observer;
pub mod pipeline;
pub mod process;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{VanishConfig, VanishConfigBuilder};
pub use driver::SessionHandle;
pub use error::{CodecError, IngestError, TransformError, VanishError, PROCESSING_FAILED};
pub use model::{
    Generation, MediaType, PipelineState, PreviewImage, ProcessedImage, SessionSnapshot,
    SourceFile,
};
pub use observer::{ChannelObserver, NoopObserver, SessionEvent, SessionObserver};
pub use pipeline::encode::DataUrl;
pub use pipeline::export::{DirectoryExporter, ExportedFile, Exporter};
pub use pipeline::ingest::Candidate;
pub use pipeline::transform::{RemoveBgClient, Transformer};
pub use process::{remove_background, remove_background_sync, remove_background_with, ProcessOutput};
pub use session::{Completion, Session, TransformTicket};
