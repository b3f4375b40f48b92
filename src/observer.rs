//! Observer trait for session events.
//!
//! Inject an [`Arc<dyn SessionObserver>`] via
//! [`crate::config::VanishConfigBuilder::observer`] to be told when the
//! session changes state. A UI renders from these notifications; the CLI
//! drives its spinner from them.
//!
//! [`ChannelObserver`] forwards every event to a Tokio broadcast channel for
//! callers that would rather consume a `Stream` than implement the trait.
//!
//! # Example
//!
//! ```rust
//! use vanish::{PipelineState, SessionObserver, VanishConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingObserver {
//!     transitions: AtomicUsize,
//! }
//!
//! impl SessionObserver for CountingObserver {
//!     fn on_state_change(&self, _from: &PipelineState, to: &PipelineState) {
//!         self.transitions.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("now {to}");
//!     }
//! }
//!
//! let observer = Arc::new(CountingObserver { transitions: AtomicUsize::new(0) });
//! let config = VanishConfig::builder()
//!     .observer(observer as Arc<dyn SessionObserver>)
//!     .build()
//!     .unwrap();
//! ```

use crate::model::{Generation, PipelineState};
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Receives session notifications.
///
/// All methods default to no-ops so implementors override only what they
/// need. Implementations must be `Send + Sync`: the session driver runs on
/// a Tokio worker thread.
pub trait SessionObserver: Send + Sync {
    /// The session moved between states. Also fired when re-entering the
    /// same state with new content (a new drop while Ready).
    fn on_state_change(&self, from: &PipelineState, to: &PipelineState) {
        let _ = (from, to);
    }

    /// A candidate file was rejected; state is unchanged.
    fn on_rejected(&self, reason: &str) {
        let _ = reason;
    }

    /// A result arrived for a source that is no longer current and was
    /// dropped.
    fn on_stale_result(&self, result_generation: Generation, current: Generation) {
        let _ = (result_generation, current);
    }

    /// The processed image was exported.
    fn on_exported(&self, file_name: &str, bytes: usize) {
        let _ = (file_name, bytes);
    }
}

/// Does nothing. Used when no observer is configured.
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

/// Convenience alias matching the type stored in [`crate::config::VanishConfig`].
pub type ObserverHandle = Arc<dyn SessionObserver>;

/// A session notification as a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged {
        from: PipelineState,
        to: PipelineState,
    },
    Rejected(String),
    StaleResult {
        result_generation: Generation,
        current: Generation,
    },
    Exported {
        file_name: String,
        bytes: usize,
    },
}

/// A boxed stream of session events.
pub type EventStream = Pin<Box<dyn Stream<Item = SessionEvent> + Send>>;

/// Forwards notifications into a broadcast channel.
pub struct ChannelObserver {
    tx: broadcast::Sender<SessionEvent>,
}

impl ChannelObserver {
    /// `capacity` bounds how far a slow subscriber may lag before it starts
    /// missing events.
    pub fn new(capacity: usize) -> Arc<Self> {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Arc::new(Self { tx })
    }

    /// Subscribe to events sent after this call. Lagged events are skipped.
    pub fn subscribe(&self) -> EventStream {
        let stream = BroadcastStream::new(self.tx.subscribe()).filter_map(|item| item.ok());
        Box::pin(stream)
    }

    fn send(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }
}

impl SessionObserver for ChannelObserver {
    fn on_state_change(&self, from: &PipelineState, to: &PipelineState) {
        self.send(SessionEvent::StateChanged {
            from: from.clone(),
            to: to.clone(),
        });
    }

    fn on_rejected(&self, reason: &str) {
        self.send(SessionEvent::Rejected(reason.to_string()));
    }

    fn on_stale_result(&self, result_generation: Generation, current: Generation) {
        self.send(SessionEvent::StaleResult {
            result_generation,
            current,
        });
    }

    fn on_exported(&self, file_name: &str, bytes: usize) {
        self.send(SessionEvent::Exported {
            file_name: file_name.to_string(),
            bytes,
        });
    }
}
