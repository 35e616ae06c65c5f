//! Per-connection session loop
//!
//! A session starts once the registry has admitted its connection. It reads
//! one logical message at a time, answers it, and for publisher images hands
//! the original envelope to the fan-out before reading the next message.
//! When the loop ends for any reason the role is released and the handle is
//! marked closed.

pub mod context;
pub mod dispatch;
pub mod reassembly;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::protocol::constants::*;
use crate::protocol::{CloseFrame, Envelope, FragmentSource, MessageKind, Response, Status};
use crate::registry::{ConnectionHandle, ConnectionState, Role, RoleRegistry};
use crate::stats::SessionStats;

pub use context::SessionContext;
pub use dispatch::{ensure_status, Dispatcher, Outcome, Validated};
pub use reassembly::{Reassembled, Reassembler, ReassemblyError};
pub use state::{SessionPhase, SessionState};

/// Limits and timeouts for one session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Bound on a reassembled message
    pub max_message_size: usize,
    /// Largest fragment requested per read
    pub read_buffer_size: usize,
    /// Wait for outbound queue space
    pub send_timeout: Duration,
    /// Wait for the close frame to be queued
    pub close_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }
}

/// Why the read loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionExit {
    /// Peer sent a close frame
    PeerClosed(Option<CloseFrame>),
    /// Server shutdown
    Shutdown,
    /// Stream ended without a close frame
    ConnectionLost,
    /// Read failed and the connection is gone
    TransportFailed,
    /// Writer stopped draining the outbound queue
    WriterGone,
}

/// Session for one admitted connection
pub struct Session<S: FragmentSource> {
    ctx: SessionContext,
    state: SessionState,
    source: S,
    handle: Arc<ConnectionHandle>,
    registry: Arc<RoleRegistry>,
    dispatcher: Arc<Dispatcher>,
    reassembler: Reassembler,
    config: SessionConfig,
    shutdown: CancellationToken,
    stats: SessionStats,
}

impl<S: FragmentSource> Session<S> {
    /// Create a session for a connection the registry has already admitted
    pub fn new(
        handle: Arc<ConnectionHandle>,
        source: S,
        registry: Arc<RoleRegistry>,
        dispatcher: Arc<Dispatcher>,
        config: SessionConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let ctx = SessionContext::new(handle.id(), handle.peer(), handle.role());
        let state = SessionState::new(handle.id(), handle.peer(), handle.role());
        let reassembler = Reassembler::new(config.max_message_size, config.read_buffer_size);

        Self {
            ctx,
            state,
            source,
            handle,
            registry,
            dispatcher,
            reassembler,
            config,
            shutdown,
            stats: SessionStats::new(),
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    /// Run until the connection leaves the open state, then tear down
    pub async fn run(mut self) -> (SessionExit, SessionStats) {
        self.state.open();
        tracing::debug!(
            session_id = self.ctx.session_id,
            role = %self.ctx.role,
            "Session open"
        );

        let exit = self.read_loop().await;
        self.close(&exit).await;
        self.teardown(&exit).await;

        (exit, self.stats)
    }

    async fn read_loop(&mut self) -> SessionExit {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return SessionExit::Shutdown,
                next = self.reassembler.next_message(&mut self.source) => next,
            };

            match next {
                Ok(Reassembled::Closed(frame)) => {
                    self.state.peer_close = frame.clone();
                    return SessionExit::PeerClosed(frame);
                }
                Ok(Reassembled::Message {
                    kind: MessageKind::Binary,
                    payload,
                }) => {
                    self.stats.record_message(payload.len());
                    tracing::debug!(
                        session_id = self.ctx.session_id,
                        size = payload.len(),
                        "Binary message ignored"
                    );
                }
                Ok(Reassembled::Message {
                    kind: MessageKind::Text,
                    payload,
                }) => {
                    self.stats.record_message(payload.len());
                    self.on_text(payload).await;
                }
                Err(ReassemblyError::Oversized { size, limit }) => {
                    tracing::warn!(
                        session_id = self.ctx.session_id,
                        size = size,
                        limit = limit,
                        "Oversized message rejected"
                    );
                    self.dispatcher.stats().record_protocol_error();
                    let error = ReassemblyError::Oversized { size, limit };
                    self.reply(Response::error(error.to_string()).to_envelope())
                        .await;
                }
                Err(ReassemblyError::Transport(e)) => {
                    tracing::warn!(
                        session_id = self.ctx.session_id,
                        error = %e,
                        "Transport error"
                    );
                    if !self.source.is_open() {
                        return SessionExit::TransportFailed;
                    }
                }
                Err(ReassemblyError::ConnectionLost) => return SessionExit::ConnectionLost,
            }

            if self.handle.state() == ConnectionState::Open && !self.handle.is_open() {
                return SessionExit::WriterGone;
            }
        }
    }

    async fn on_text(&mut self, payload: Bytes) {
        self.state.begin_validating();

        let outcome = match self.dispatcher.validate(&self.ctx, &payload) {
            Validated::Message(inbound) => {
                self.state.begin_dispatching();
                tracing::debug!(
                    session_id = self.ctx.session_id,
                    message_type = %inbound.message_type,
                    size = payload.len(),
                    "Dispatching"
                );
                self.dispatcher.dispatch(&self.ctx, inbound, payload).await
            }
            Validated::Reply(reply) => Outcome {
                reply: Some(ensure_status(reply)),
                relay: None,
            },
            Validated::Dropped => Outcome::default(),
        };

        if let Some(reply) = outcome.reply {
            self.reply(reply).await;
        }

        // Reply is queued first; fan-out runs detached
        if let Some(relay) = outcome.relay {
            let _fanout = self.dispatcher.relay(relay).await;
            self.stats.images += 1;
        }

        self.state.message_done();
    }

    async fn reply(&mut self, reply: Envelope) {
        if reply.status() == Some(Status::Error) {
            self.stats.errors += 1;
        }

        let bytes = match reply.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(session_id = self.ctx.session_id, error = %e, "Reply encoding failed");
                return;
            }
        };

        match self.handle.send(bytes, self.config.send_timeout).await {
            Ok(()) => self.stats.replies_sent += 1,
            Err(e) => {
                tracing::warn!(session_id = self.ctx.session_id, error = %e, "Reply not sent");
            }
        }
    }

    async fn close(&mut self, exit: &SessionExit) {
        self.state.close();
        self.handle.mark_closing();

        let frame = match exit {
            SessionExit::PeerClosed(frame) => Some(
                frame
                    .clone()
                    .unwrap_or_else(|| CloseFrame::new(CLOSE_NORMAL, "")),
            ),
            SessionExit::Shutdown => Some(CloseFrame::new(CLOSE_GOING_AWAY, "server shutting down")),
            _ => None,
        };

        if let Some(frame) = frame {
            let code = frame.code;
            if let Err(e) = self
                .handle
                .send_close(Some(frame), self.config.close_timeout)
                .await
            {
                tracing::debug!(
                    session_id = self.ctx.session_id,
                    code = code,
                    error = %e,
                    "Close frame not sent"
                );
            }
        }
    }

    async fn teardown(&mut self, exit: &SessionExit) {
        match self.ctx.role {
            Role::Publisher => {
                self.registry.release_publisher(self.ctx.session_id).await;
            }
            Role::Subscriber => {
                self.registry.release_subscriber(self.ctx.session_id).await;
            }
        }

        self.handle.mark_closed();
        self.state.mark_closed();
        self.stats.duration = self.state.duration();

        tracing::info!(
            session_id = self.ctx.session_id,
            peer = %self.ctx.peer_addr,
            role = %self.ctx.role,
            exit = ?exit,
            messages = self.stats.messages_received,
            bytes = self.stats.bytes_received,
            replies = self.stats.replies_sent,
            images = self.stats.images,
            errors = self.stats.errors,
            duration_ms = self.stats.duration.as_millis() as u64,
            "Session closed"
        );
    }
}
