//! Event-loop driver: one task owns the [`Session`]; everything else talks
//! to it through a [`SessionHandle`].
//!
//! ## Why an owning task?
//!
//! A UI produces actions (drop, process, download, reset) at any time, and
//! two kinds of work finish later: building a preview and the remote call.
//! Funnelling actions and completions through one task means session state
//! has exactly one writer, so it needs no lock. Slow work runs in spawned
//! tasks that report back over a channel, each result tagged with what it
//! was started for:
//!
//! * transform results carry the session [`Generation`] and are dropped by
//!   [`Session::complete_transform`] if the user has since dropped a new
//!   file or reset;
//! * preview results carry an ingestion ticket and are dropped if another
//!   drop or a reset came in while the preview was being built.
//!
//! Nothing is cancelled. A superseded task runs to completion and its
//! result is ignored.

use crate::config::VanishConfig;
use crate::error::{TransformError, VanishError};
use crate::model::{Generation, PipelineState, PreviewImage, SessionSnapshot, SourceFile};
use crate::pipeline::export::{ExportedFile, Exporter};
use crate::pipeline::ingest::Candidate;
use crate::pipeline::transform::Transformer;
use crate::session::{build_preview, Session};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};

type Reply<T> = oneshot::Sender<T>;

enum Command {
    Ingest {
        candidates: Vec<Candidate>,
        reply: Reply<Result<Generation, VanishError>>,
    },
    Transform {
        reply: Reply<bool>,
    },
    Download {
        reply: Reply<Result<ExportedFile, VanishError>>,
    },
    Reset {
        reply: Reply<()>,
    },
    Snapshot {
        reply: Reply<SessionSnapshot>,
    },
    Preview {
        reply: Reply<Option<PreviewImage>>,
    },
}

enum Done {
    Preview {
        ticket: u64,
        source: SourceFile,
        result: Result<PreviewImage, VanishError>,
    },
    Transform {
        generation: Generation,
        result: Result<Vec<u8>, TransformError>,
    },
}

/// Cloneable front end to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<PipelineState>,
}

/// Start a session on the current Tokio runtime.
///
/// The session runs until every [`SessionHandle`] has been dropped.
pub fn spawn(
    config: VanishConfig,
    transformer: Arc<dyn Transformer>,
    exporter: Arc<dyn Exporter>,
) -> SessionHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    let (state_tx, state_rx) = watch::channel(PipelineState::Empty);
    let driver = Driver {
        session: Session::new(config),
        transformer,
        exporter,
        state_tx,
        latest_ingest: 0,
        pending_ingest: None,
    };
    tokio::spawn(driver.run(cmd_rx));
    SessionHandle {
        commands: cmd_tx,
        state: state_rx,
    }
}

impl SessionHandle {
    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T, VanishError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| VanishError::SessionClosed)?;
        rx.await.map_err(|_| VanishError::SessionClosed)
    }

    /// Offer dropped files. Resolves once the file is rejected or its
    /// preview is committed; meanwhile the session keeps serving other
    /// actions.
    pub async fn ingest(&self, candidates: Vec<Candidate>) -> Result<Generation, VanishError> {
        self.request(|reply| Command::Ingest { candidates, reply })
            .await?
    }

    /// Press the process button. Returns whether a remote call was started;
    /// `false` means the trigger was inert in the current state.
    pub async fn transform(&self) -> Result<bool, VanishError> {
        self.request(|reply| Command::Transform { reply }).await
    }

    pub async fn download(&self) -> Result<ExportedFile, VanishError> {
        self.request(|reply| Command::Download { reply }).await?
    }

    pub async fn reset(&self) -> Result<(), VanishError> {
        self.request(|reply| Command::Reset { reply }).await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, VanishError> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    pub async fn preview(&self) -> Result<Option<PreviewImage>, VanishError> {
        self.request(|reply| Command::Preview { reply }).await
    }

    /// Current state as last published by the driver.
    pub fn state(&self) -> PipelineState {
        self.state.borrow().clone()
    }

    /// Wait until the state satisfies `pred`.
    pub async fn wait_for(
        &self,
        mut pred: impl FnMut(&PipelineState) -> bool,
    ) -> Result<PipelineState, VanishError> {
        let mut rx = self.state.clone();
        let state = rx
            .wait_for(|s| pred(s))
            .await
            .map_err(|_| VanishError::SessionClosed)?;
        Ok(state.clone())
    }

    /// Wait until no remote call is outstanding.
    pub async fn settled(&self) -> Result<PipelineState, VanishError> {
        self.wait_for(|s| *s != PipelineState::Processing).await
    }
}

struct Driver {
    session: Session,
    transformer: Arc<dyn Transformer>,
    exporter: Arc<dyn Exporter>,
    state_tx: watch::Sender<PipelineState>,
    /// Ticket of the most recent accepted drop; older previews are dropped.
    latest_ingest: u64,
    pending_ingest: Option<(u64, Reply<Result<Generation, VanishError>>)>,
}

impl Driver {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        info!("Session driver started");

        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.handle(cmd, &done_tx).await,
                    None => break,
                },
                Some(done) = done_rx.recv() => self.apply(done),
            }
            self.publish();
        }

        info!("Session driver stopped");
    }

    async fn handle(&mut self, cmd: Command, done_tx: &mpsc::UnboundedSender<Done>) {
        match cmd {
            Command::Ingest { candidates, reply } => {
                let source = match self.session.accept_dropped(candidates) {
                    Ok(source) => source,
                    Err(e) => {
                        let _ = reply.send(Err(e.into()));
                        return;
                    }
                };
                self.supersede_pending();
                self.latest_ingest += 1;
                let ticket = self.latest_ingest;
                self.pending_ingest = Some((ticket, reply));

                let done_tx = done_tx.clone();
                tokio::spawn(async move {
                    let result = build_preview(&source).await;
                    let _ = done_tx.send(Done::Preview {
                        ticket,
                        source,
                        result,
                    });
                });
            }
            Command::Transform { reply } => {
                let Some(ticket) = self.session.begin_transform() else {
                    let _ = reply.send(false);
                    return;
                };
                let transformer = Arc::clone(&self.transformer);
                let done_tx = done_tx.clone();
                tokio::spawn(async move {
                    let result = transformer.transform(ticket.source()).await;
                    let _ = done_tx.send(Done::Transform {
                        generation: ticket.generation(),
                        result,
                    });
                });
                self.publish();
                let _ = reply.send(true);
            }
            Command::Download { reply } => {
                let _ = reply.send(self.session.download(self.exporter.as_ref()).await);
            }
            Command::Reset { reply } => {
                self.supersede_pending();
                self.latest_ingest += 1;
                self.session.reset();
                self.publish();
                let _ = reply.send(());
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.session.snapshot());
            }
            Command::Preview { reply } => {
                let _ = reply.send(self.session.preview().cloned());
            }
        }
    }

    fn apply(&mut self, done: Done) {
        match done {
            Done::Preview {
                ticket,
                source,
                result,
            } => {
                if ticket != self.latest_ingest {
                    debug!("Dropping preview for superseded drop #{}", ticket);
                    return;
                }
                let Some((_, reply)) = self.pending_ingest.take() else {
                    return;
                };
                let outcome = result.map(|preview| self.session.commit(source, preview));
                self.publish();
                let _ = reply.send(outcome);
            }
            Done::Transform { generation, result } => {
                self.session.complete_transform(generation, result);
            }
        }
    }

    fn supersede_pending(&mut self) {
        if let Some((ticket, reply)) = self.pending_ingest.take() {
            debug!("Drop #{} superseded before its preview was ready", ticket);
            let _ = reply.send(Err(VanishError::Superseded));
        }
    }

    /// Push the current state to watchers. Called before any reply that
    /// follows a transition, so a caller never observes the old state after
    /// its request returns.
    fn publish(&self) {
        let state = self.session.state();
        self.state_tx.send_if_modified(|current| {
            if current != state {
                *current = state.clone();
                true
            } else {
                false
            }
        });
    }
}
