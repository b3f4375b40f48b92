//! The session orchestrator: one user's source image, its preview, its
//! processed result and the state machine tying them together.
//!
//! ```text
//!            ingest ok                trigger              remote ok
//!   Empty ─────────────▶ Ready ───────────────▶ Processing ──────────▶ Completed
//!     ▲                    ▲                       │                     │
//!     │                    │ trigger (retry)       │ remote failure      │ download
//!     │                    └──────── Failed ◀──────┘                     ▼
//!     │                                                              Completed
//!     └──────────────────────── reset (from any state) ─────────────────────
//! ```
//!
//! A new ingestion is accepted in every state and lands in `Ready` with
//! fresh content; a rejected one changes nothing.
//!
//! ## Stale results
//!
//! Every accepted ingestion and every reset bumps the session's
//! [`Generation`]. A transform is started with [`Session::begin_transform`],
//! which returns a [`TransformTicket`] stamped with the current generation;
//! its result is applied by [`Session::complete_transform`] only if that
//! generation is still current. Anything else is a late answer for an image
//! the user has already replaced or cleared, and is dropped.
//!
//! The two-phase API is what the [`crate::driver`] event loop uses. Callers
//! that own the session outright can use the one-call [`Session::ingest`]
//! and [`Session::transform`] instead.

use crate::config::VanishConfig;
use crate::error::{IngestError, TransformError, VanishError, PROCESSING_FAILED};
use crate::model::{
    Generation, PipelineState, PreviewImage, ProcessedImage, SessionSnapshot, SourceFile,
};
use crate::observer::{NoopObserver, ObserverHandle};
use crate::pipeline::encode;
use crate::pipeline::export::{ExportedFile, Exporter};
use crate::pipeline::ingest::{self, Candidate};
use crate::pipeline::transform::Transformer;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Permission to run one remote transform for one source file.
#[derive(Debug, Clone)]
pub struct TransformTicket {
    generation: Generation,
    source: SourceFile,
}

impl TransformTicket {
    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn source(&self) -> &SourceFile {
        &self.source
    }
}

/// What happened to a transform result handed back to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The session moved to `Completed`.
    Completed,
    /// The session moved to `Failed`.
    Failed,
    /// The result belonged to an older generation and was dropped.
    Stale,
}

/// A single user session.
///
/// Content only enters through [`Session::ingest`] and
/// [`Session::ingest_dropped`]; a source cannot be installed unvalidated:
///
/// ```compile_fail
/// use vanish::{DataUrl, MediaType, PreviewImage, Session, SourceFile, VanishConfig};
///
/// let mut session = Session::new(VanishConfig::default());
/// let source = SourceFile {
///     name: "huge.png".into(),
///     media_type: MediaType::Png,
///     bytes: vec![0; 20 * 1024 * 1024],
/// };
/// let preview = PreviewImage(DataUrl::parse("data:image/gif;base64,AAAA").unwrap());
/// session.commit(source, preview);
/// ```
pub struct Session {
    config: VanishConfig,
    observer: ObserverHandle,
    state: PipelineState,
    generation: Generation,
    source: Option<SourceFile>,
    preview: Option<PreviewImage>,
    processed: Option<ProcessedImage>,
    /// Decoded length of `processed`.
    processed_size: Option<u64>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("generation", &self.generation)
            .field("source", &self.source)
            .field("has_preview", &self.preview.is_some())
            .field("has_processed", &self.processed.is_some())
            .finish()
    }
}

impl Session {
    pub fn new(config: VanishConfig) -> Self {
        let observer = config
            .observer
            .clone()
            .unwrap_or_else(|| Arc::new(NoopObserver));
        Self {
            config,
            observer,
            state: PipelineState::Empty,
            generation: Generation::default(),
            source: None,
            preview: None,
            processed: None,
            processed_size: None,
        }
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn config(&self) -> &VanishConfig {
        &self.config
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn source(&self) -> Option<&SourceFile> {
        self.source.as_ref()
    }

    pub fn preview(&self) -> Option<&PreviewImage> {
        self.preview.as_ref()
    }

    pub fn processed(&self) -> Option<&ProcessedImage> {
        self.processed.as_ref()
    }

    /// Failure reason while in `Failed`.
    pub fn error(&self) -> Option<&str> {
        match &self.state {
            PipelineState::Failed(reason) => Some(reason),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state.clone(),
            generation: self.generation,
            source_name: self.source.as_ref().map(|s| s.name.clone()),
            source_type: self.source.as_ref().map(|s| s.media_type),
            source_size: self.source.as_ref().map(SourceFile::size),
            has_preview: self.preview.is_some(),
            has_processed: self.processed.is_some(),
            processed_size: self.processed_size,
            error: self.error().map(str::to_string),
        }
    }

    // ── Ingestion ────────────────────────────────────────────────────────

    /// Validate a candidate without touching session state.
    pub fn accept(&self, candidate: Candidate) -> Result<SourceFile, IngestError> {
        ingest::validate(candidate, self.config.max_file_bytes).inspect_err(|e| {
            info!("Rejected file: {}", e);
            self.observer.on_rejected(&e.to_string());
        })
    }

    /// Load a file from disk for [`Self::ingest`]. A file that is too large
    /// or unreadable is reported to the observer like any other rejection.
    pub async fn load(&self, path: impl AsRef<Path>) -> Result<Candidate, IngestError> {
        Candidate::from_path(path, self.config.max_file_bytes)
            .await
            .inspect_err(|e| {
                info!("Rejected file: {}", e);
                self.observer.on_rejected(&e.to_string());
            })
    }

    /// Same as [`Self::accept`] for a drop event, which must carry exactly
    /// one file.
    pub fn accept_dropped(&self, candidates: Vec<Candidate>) -> Result<SourceFile, IngestError> {
        match ingest::single(candidates) {
            Ok(candidate) => self.accept(candidate),
            Err(e) => {
                info!("Rejected drop: {}", e);
                self.observer.on_rejected(&e.to_string());
                Err(e)
            }
        }
    }

    /// Install a validated source and the preview built from it, replacing
    /// whatever the session held. Returns the new generation.
    pub(crate) fn commit(&mut self, source: SourceFile, preview: PreviewImage) -> Generation {
        self.generation = self.generation.next();
        info!(
            "Loaded '{}' ({} bytes, {}) as generation {}",
            source.name,
            source.size(),
            source.media_type,
            self.generation
        );
        self.source = Some(source);
        self.preview = Some(preview);
        self.processed = None;
        self.processed_size = None;
        self.set_state(PipelineState::Ready);
        self.generation
    }

    /// Validate, build the preview, and commit.
    ///
    /// Either every field is replaced or none is: a rejection or a preview
    /// failure leaves the session exactly as it was.
    pub async fn ingest(&mut self, candidate: Candidate) -> Result<Generation, VanishError> {
        let source = self.accept(candidate)?;
        let preview = build_preview(&source).await?;
        Ok(self.commit(source, preview))
    }

    /// [`Self::ingest`] for a drop event.
    pub async fn ingest_dropped(
        &mut self,
        candidates: Vec<Candidate>,
    ) -> Result<Generation, VanishError> {
        let source = self.accept_dropped(candidates)?;
        let preview = build_preview(&source).await?;
        Ok(self.commit(source, preview))
    }

    // ── Transform ────────────────────────────────────────────────────────

    /// Start a transform if the trigger is actionable.
    ///
    /// Returns `None` (and changes nothing) in `Empty`, `Processing` and
    /// `Completed`, so a second trigger while a call is outstanding cannot
    /// start a second call.
    pub fn begin_transform(&mut self) -> Option<TransformTicket> {
        if !self.state.can_transform() {
            debug!("Transform trigger ignored in state {}", self.state);
            return None;
        }
        let source = self.source.clone()?;
        self.set_state(PipelineState::Processing);
        Some(TransformTicket {
            generation: self.generation,
            source,
        })
    }

    /// Apply the result of a transform started for `generation`.
    pub fn complete_transform(
        &mut self,
        generation: Generation,
        result: Result<Vec<u8>, TransformError>,
    ) -> Completion {
        if generation != self.generation || self.state != PipelineState::Processing {
            warn!(
                "Dropping stale transform result for generation {} (current {}, {})",
                generation, self.generation, self.state
            );
            self.observer.on_stale_result(generation, self.generation);
            return Completion::Stale;
        }

        match result {
            Ok(bytes) => {
                let url = encode::encode(&bytes, self.config.result_media_type.mime());
                info!("Processing complete: {} bytes", bytes.len());
                self.processed = Some(ProcessedImage(url));
                self.processed_size = Some(bytes.len() as u64);
                self.set_state(PipelineState::Completed);
                Completion::Completed
            }
            Err(e) => {
                warn!("Error removing background: {}", e);
                self.set_state(PipelineState::Failed(PROCESSING_FAILED.to_string()));
                Completion::Failed
            }
        }
    }

    /// Run one transform to completion with `transformer`.
    ///
    /// On failure the session is left in `Failed` and the underlying error
    /// is returned for logging; it is never shown to users as-is.
    pub async fn transform(&mut self, transformer: &dyn Transformer) -> Result<(), VanishError> {
        let ticket = self.begin_transform().ok_or_else(|| VanishError::NotActionable {
            state: self.state.to_string(),
        })?;
        let result = transformer.transform(&ticket.source).await;
        let err = result.as_ref().err().cloned();
        match self.complete_transform(ticket.generation, result) {
            Completion::Completed => Ok(()),
            Completion::Failed => Err(err
                .map(VanishError::Transform)
                .unwrap_or_else(|| VanishError::Internal(PROCESSING_FAILED.into()))),
            Completion::Stale => Err(VanishError::Internal("transform result went stale".into())),
        }
    }

    // ── Download / reset ─────────────────────────────────────────────────

    /// Export the processed image under the configured file name.
    /// No state change.
    pub async fn download(&self, exporter: &dyn Exporter) -> Result<ExportedFile, VanishError> {
        let processed = match (&self.state, &self.processed) {
            (PipelineState::Completed, Some(p)) => p,
            _ => {
                return Err(VanishError::NothingToDownload {
                    state: self.state.to_string(),
                })
            }
        };
        let bytes = processed.data_url().to_bytes()?;
        let exported = exporter.export(&self.config.export_file_name, &bytes).await?;
        self.observer.on_exported(&exported.file_name, exported.bytes);
        Ok(exported)
    }

    /// Clear everything and return to `Empty`. Any outstanding transform
    /// result becomes stale.
    pub fn reset(&mut self) {
        self.generation = self.generation.next();
        self.source = None;
        self.preview = None;
        self.processed = None;
        self.processed_size = None;
        info!("Session reset (generation {})", self.generation);
        self.set_state(PipelineState::Empty);
    }

    fn set_state(&mut self, to: PipelineState) {
        let from = std::mem::replace(&mut self.state, to);
        debug!("State {} → {}", from, self.state);
        self.observer.on_state_change(&from, &self.state);
    }
}

/// Encode a source file's bytes as its preview.
pub(crate) async fn build_preview(source: &SourceFile) -> Result<PreviewImage, VanishError> {
    let url = encode::encode_reader(source.bytes.as_slice(), source.media_type.mime()).await?;
    Ok(PreviewImage(url))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MediaType;
    use crate::pipeline::transform::MockTransformer;

    fn png_bytes(len: usize) -> Vec<u8> {
        let mut v = b"\x89PNG\r\n\x1a\n".to_vec();
        v.resize(len.max(8), 7);
        v
    }

    fn png(name: &str) -> Candidate {
        Candidate::from_bytes(name, Some("image/png"), png_bytes(32))
    }

    async fn ready_session() -> Session {
        let mut s = Session::new(VanishConfig::default());
        s.ingest(png("a.png")).await.unwrap();
        s
    }

    #[tokio::test]
    async fn ingest_moves_empty_to_ready_with_preview() {
        let mut s = Session::new(VanishConfig::default());
        let generation = s.ingest(png("a.png")).await.unwrap();

        assert_eq!(s.state(), &PipelineState::Ready);
        assert_eq!(generation, Generation(1));
        let preview = s.preview().unwrap().data_url();
        assert!(preview.as_str().starts_with("data:image/png;base64,"));
        assert_eq!(preview.to_bytes().unwrap(), png_bytes(32));
        assert!(s.processed().is_none());
    }

    #[tokio::test]
    async fn rejected_ingest_leaves_state_untouched() {
        let mut s = ready_session().await;
        let before = s.snapshot();
        let preview_before = s.preview().cloned();

        let gif = Candidate::from_bytes("a.gif", Some("image/gif"), b"GIF89a".to_vec());
        let err = s.ingest(gif).await.unwrap_err();
        assert!(matches!(
            err,
            VanishError::Validation(IngestError::UnsupportedType { .. })
        ));
        assert_eq!(s.snapshot(), before);
        assert_eq!(s.preview().cloned(), preview_before);
    }

    #[tokio::test]
    async fn rejected_ingest_from_empty_stays_empty() {
        let config = VanishConfig::builder().max_file_bytes(16).build().unwrap();
        let mut s = Session::new(config);
        let err = s.ingest(png("big.png")).await.unwrap_err();
        assert!(matches!(
            err,
            VanishError::Validation(IngestError::FileTooLarge { .. })
        ));
        assert_eq!(s.state(), &PipelineState::Empty);
        assert!(s.source().is_none());
        assert_eq!(s.generation(), Generation(0));
    }

    #[tokio::test]
    async fn declared_png_with_arbitrary_bytes_becomes_ready() {
        let mut s = Session::new(VanishConfig::default());
        s.ingest(Candidate::from_bytes("photo.png", Some("image/png"), vec![1u8; 1024]))
            .await
            .unwrap();
        assert_eq!(s.state(), &PipelineState::Ready);
        assert_eq!(s.source().unwrap().media_type, MediaType::Png);
        let preview = s.preview().unwrap().data_url();
        assert!(preview.as_str().starts_with("data:image/png;base64,"));
        assert_eq!(preview.to_bytes().unwrap(), vec![1u8; 1024]);
    }

    #[tokio::test]
    async fn declared_jpeg_with_no_bytes_becomes_ready() {
        let mut s = Session::new(VanishConfig::default());
        s.ingest(Candidate::from_bytes("empty.jpg", Some("image/jpeg"), Vec::new()))
            .await
            .unwrap();
        assert_eq!(s.state(), &PipelineState::Ready);
        assert!(!s.preview().unwrap().data_url().as_str().is_empty());
    }

    #[tokio::test]
    async fn snapshot_reports_processed_size_until_cleared() {
        let mut s = ready_session().await;
        assert_eq!(s.snapshot().processed_size, None);

        let ticket = s.begin_transform().unwrap();
        s.complete_transform(ticket.generation(), Ok(vec![9u8; 77]));
        assert_eq!(s.snapshot().processed_size, Some(77));

        s.ingest(png("b.png")).await.unwrap();
        assert_eq!(s.snapshot().processed_size, None);

        let ticket = s.begin_transform().unwrap();
        s.complete_transform(ticket.generation(), Ok(vec![9u8; 5]));
        s.reset();
        assert_eq!(s.snapshot().processed_size, None);
    }

    #[tokio::test]
    async fn load_reports_oversized_file_to_observer() {
        use crate::observer::{ChannelObserver, SessionEvent, SessionObserver};
        use tokio_stream::StreamExt as _;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.png");
        std::fs::write(&path, png_bytes(64)).unwrap();

        let observer = ChannelObserver::new(8);
        let mut events = observer.subscribe();
        let config = VanishConfig::builder()
            .max_file_bytes(16)
            .observer(observer as Arc<dyn SessionObserver>)
            .build()
            .unwrap();
        let s = Session::new(config);

        let err = s.load(&path).await.unwrap_err();
        assert!(matches!(err, IngestError::FileTooLarge { size: 64, limit: 16 }));
        match events.next().await {
            Some(SessionEvent::Rejected(reason)) => assert_eq!(reason, err.to_string()),
            other => panic!("expected a rejection event, got {other:?}"),
        }
        assert_eq!(s.state(), &PipelineState::Empty);
    }

    #[tokio::test]
    async fn load_reads_file_within_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cat.png");
        std::fs::write(&path, png_bytes(64)).unwrap();

        let mut s = Session::new(VanishConfig::default());
        let candidate = s.load(&path).await.unwrap();
        s.ingest(candidate).await.unwrap();
        assert_eq!(s.state(), &PipelineState::Ready);
        assert_eq!(s.source().unwrap().name, "cat.png");
    }

    #[tokio::test]
    async fn drop_must_carry_one_file() {
        let mut s = Session::new(VanishConfig::default());
        let err = s
            .ingest_dropped(vec![png("a.png"), png("b.png")])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            VanishError::Validation(IngestError::TooManyFiles { count: 2 })
        ));
        s.ingest_dropped(vec![png("a.png")]).await.unwrap();
        assert_eq!(s.state(), &PipelineState::Ready);
    }

    #[tokio::test]
    async fn trigger_is_inert_outside_ready_and_failed() {
        let mut s = Session::new(VanishConfig::default());
        assert!(s.begin_transform().is_none());

        s.ingest(png("a.png")).await.unwrap();
        let ticket = s.begin_transform().expect("ready should start");
        assert_eq!(s.state(), &PipelineState::Processing);
        assert!(s.begin_transform().is_none(), "second trigger must be inert");

        s.complete_transform(ticket.generation(), Ok(png_bytes(10)));
        assert_eq!(s.state(), &PipelineState::Completed);
        assert!(s.begin_transform().is_none(), "completed trigger must be inert");
    }

    #[tokio::test]
    async fn failure_then_retry_succeeds() {
        let mut s = ready_session().await;

        let t = s.begin_transform().unwrap();
        let c = s.complete_transform(t.generation(), Err(TransformError::Status { status: 500 }));
        assert_eq!(c, Completion::Failed);
        assert_eq!(s.error(), Some(PROCESSING_FAILED));
        assert!(s.source().is_some());
        assert!(s.preview().is_some());

        let t = s.begin_transform().expect("failed should allow retry");
        assert_eq!(s.complete_transform(t.generation(), Ok(vec![1, 2])), Completion::Completed);
        assert_eq!(s.error(), None);
    }

    #[tokio::test]
    async fn result_after_reset_is_stale() {
        let mut s = ready_session().await;
        let t = s.begin_transform().unwrap();
        s.reset();
        assert_eq!(s.complete_transform(t.generation(), Ok(vec![1])), Completion::Stale);
        assert_eq!(s.state(), &PipelineState::Empty);
        assert!(s.processed().is_none());
    }

    #[tokio::test]
    async fn result_after_new_ingest_is_stale() {
        let mut s = ready_session().await;
        let t = s.begin_transform().unwrap();
        s.ingest(png("b.png")).await.unwrap();

        assert_eq!(s.complete_transform(t.generation(), Ok(vec![1])), Completion::Stale);
        assert_eq!(s.state(), &PipelineState::Ready);
        assert_eq!(s.source().unwrap().name, "b.png");
        assert!(s.processed().is_none());
    }

    #[tokio::test]
    async fn new_ingest_clears_processed_result() {
        let mut s = ready_session().await;
        let t = s.begin_transform().unwrap();
        s.complete_transform(t.generation(), Ok(vec![9]));
        assert!(s.processed().is_some());

        s.ingest(png("b.png")).await.unwrap();
        assert_eq!(s.state(), &PipelineState::Ready);
        assert!(s.processed().is_none());
    }

    #[tokio::test]
    async fn reset_clears_everything_from_any_state() {
        let mut s = ready_session().await;
        let t = s.begin_transform().unwrap();
        s.complete_transform(t.generation(), Err(TransformError::EmptyBody));
        s.reset();

        let snap = s.snapshot();
        assert_eq!(snap.state, PipelineState::Empty);
        assert!(snap.source_name.is_none());
        assert!(!snap.has_preview);
        assert!(!snap.has_processed);
        assert!(snap.error.is_none());
    }

    #[tokio::test]
    async fn transform_with_mock_calls_service_once() {
        let mut s = ready_session().await;
        let mut mock = MockTransformer::new();
        mock.expect_transform()
            .times(1)
            .returning(|_| Ok(b"\x89PNGresult".to_vec()));

        s.transform(&mock).await.unwrap();
        assert_eq!(s.state(), &PipelineState::Completed);
        assert_eq!(
            s.processed().unwrap().data_url().to_bytes().unwrap(),
            b"\x89PNGresult"
        );

        // Completed: trigger is inert, mock would panic on a second call.
        let err = s.transform(&mock).await.unwrap_err();
        assert!(matches!(err, VanishError::NotActionable { .. }));
    }

    #[tokio::test]
    async fn transform_failure_surfaces_error_and_fails_state() {
        let mut s = ready_session().await;
        let mut mock = MockTransformer::new();
        mock.expect_transform()
            .times(1)
            .returning(|_| Err(TransformError::Status { status: 502 }));

        let err = s.transform(&mock).await.unwrap_err();
        assert!(matches!(
            err,
            VanishError::Transform(TransformError::Status { status: 502 })
        ));
        assert_eq!(s.state(), &PipelineState::Failed(PROCESSING_FAILED.into()));
    }

    #[tokio::test]
    async fn download_requires_completed() {
        let s = ready_session().await;
        let dir = tempfile::tempdir().unwrap();
        let exporter = crate::pipeline::export::DirectoryExporter::new(dir.path());
        let err = s.download(&exporter).await.unwrap_err();
        assert!(matches!(err, VanishError::NothingToDownload { .. }));
    }

    #[tokio::test]
    async fn processed_image_uses_result_media_type() {
        let config = VanishConfig::builder()
            .result_media_type(MediaType::Jpeg)
            .build()
            .unwrap();
        let mut s = Session::new(config);
        s.ingest(png("a.png")).await.unwrap();
        let t = s.begin_transform().unwrap();
        s.complete_transform(t.generation(), Ok(vec![1]));
        assert_eq!(s.processed().unwrap().data_url().mime(), "image/jpeg");
    }
}
