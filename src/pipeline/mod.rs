//! Pipeline stages for background removal.
//!
//! Each submodule implements one step and knows nothing about session
//! state; [`crate::session`] sequences them.
//!
//! ## Data Flow
//!
//! ```text
//! ingest ──▶ encode ──▶ transform ──▶ encode ──▶ export
//! (validate)  (preview)  (HTTP POST)   (result)   (file)
//! ```
//!
//! 1. [`ingest`]    — validate a dropped file: one file, PNG/JPEG, ≤ 10 MiB
//! 2. [`encode`]    — bytes ⇄ `data:` URL for rendering
//! 3. [`transform`] — multipart upload to the removal service; the only
//!    stage with network I/O
//! 4. [`export`]    — write the result under its download name

pub mod encode;
pub mod export;
pub mod ingest;
pub mod transform;
