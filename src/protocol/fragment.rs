//! Wire fragments
//!
//! A logical message arrives as one or more fragments. Each fragment carries
//! at most the reader's buffer capacity, a kind, and an end-of-message flag.
//! The transport adapter in `server::ws` produces fragments from WebSocket
//! frames; tests script them directly.

use std::future::Future;

use bytes::Bytes;
use thiserror::Error;

/// Close code and reason sent or received in a close frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: u16,
    pub reason: String,
}

impl CloseFrame {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for CloseFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.reason.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{} ({})", self.code, self.reason)
        }
    }
}

/// Kind of a complete logical message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Binary,
}

/// Kind of a single fragment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentKind {
    Text,
    Binary,
    /// Peer-initiated close, optionally with code and reason
    Close(Option<CloseFrame>),
}

/// One read from the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub kind: FragmentKind,
    pub data: Bytes,
    pub end_of_message: bool,
}

impl Fragment {
    pub fn text(data: impl Into<Bytes>, end_of_message: bool) -> Self {
        Self {
            kind: FragmentKind::Text,
            data: data.into(),
            end_of_message,
        }
    }

    pub fn binary(data: impl Into<Bytes>, end_of_message: bool) -> Self {
        Self {
            kind: FragmentKind::Binary,
            data: data.into(),
            end_of_message,
        }
    }

    pub fn close(frame: Option<CloseFrame>) -> Self {
        Self {
            kind: FragmentKind::Close(frame),
            data: Bytes::new(),
            end_of_message: true,
        }
    }
}

/// Frame queued for a connection's writer task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// UTF-8 JSON text
    Text(Bytes),
    Close(Option<CloseFrame>),
}

/// Transport-level failures
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("read failed: {0}")]
    Read(String),

    #[error("write failed: {0}")]
    Write(String),

    #[error("outbound queue closed")]
    QueueClosed,

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Source of fragments for one connection
pub trait FragmentSource {
    /// Read the next fragment of at most `max_len` bytes.
    ///
    /// Returns `Ok(None)` when the underlying stream has ended.
    fn read_fragment(
        &mut self,
        max_len: usize,
    ) -> impl Future<Output = Result<Option<Fragment>, TransportError>> + Send;

    /// Whether the connection can still deliver fragments
    fn is_open(&self) -> bool;
}
