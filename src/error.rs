//! Error types for the relay server and client

use thiserror::Error;

use crate::protocol::{CloseFrame, EnvelopeError};

/// Errors surfaced by the public server and client APIs
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The server answered the upgrade with an HTTP error
    #[error("upgrade rejected with HTTP {status}")]
    Rejected { status: u16 },

    /// The peer closed the connection
    #[error("connection closed ({})", describe_close(.0))]
    Closed(Option<CloseFrame>),

    #[error("envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid image payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),
}

fn describe_close(frame: &Option<CloseFrame>) -> String {
    match frame {
        Some(frame) => frame.to_string(),
        None => "no close frame".to_string(),
    }
}

impl Error {
    /// Close code sent by the peer, if any
    pub fn close_code(&self) -> Option<u16> {
        match self {
            Error::Closed(Some(frame)) => Some(frame.code),
            _ => None,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
