//! Logical message reassembly
//!
//! Fragments are accumulated until one carries the end-of-message flag. The
//! buffer is bounded; once a message overflows it, the rest of that message
//! is read and discarded so the next read starts on a message boundary.

use bytes::{Bytes, BytesMut};
use thiserror::Error;

use crate::protocol::constants::{DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_READ_BUFFER_SIZE};
use crate::protocol::{CloseFrame, FragmentKind, FragmentSource, MessageKind, TransportError};

/// Result of one reassembly step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reassembled {
    /// A complete logical message
    Message { kind: MessageKind, payload: Bytes },
    /// The peer started the close handshake
    Closed(Option<CloseFrame>),
}

#[derive(Debug, Error)]
pub enum ReassemblyError {
    #[error("message of {size} bytes exceeds the {limit} byte limit")]
    Oversized { size: usize, limit: usize },

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("connection lost")]
    ConnectionLost,
}

/// Per-connection reassembly buffer
#[derive(Debug)]
pub struct Reassembler {
    max_message_size: usize,
    read_buffer_size: usize,
    buffer: BytesMut,
}

impl Reassembler {
    pub fn new(max_message_size: usize, read_buffer_size: usize) -> Self {
        Self {
            max_message_size,
            read_buffer_size: read_buffer_size.max(1),
            buffer: BytesMut::with_capacity(read_buffer_size.min(max_message_size)),
        }
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Bytes currently held for an in-flight message
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Read fragments until one logical message or a close is complete
    pub async fn next_message<S>(&mut self, source: &mut S) -> Result<Reassembled, ReassemblyError>
    where
        S: FragmentSource,
    {
        self.buffer.clear();
        let mut message_kind = None;
        // Total size seen once the bound was crossed
        let mut overflow: Option<usize> = None;

        loop {
            let fragment = match source.read_fragment(self.read_buffer_size).await {
                Ok(Some(fragment)) => fragment,
                Ok(None) => {
                    self.buffer.clear();
                    return Err(ReassemblyError::ConnectionLost);
                }
                Err(e) => {
                    self.buffer.clear();
                    return Err(e.into());
                }
            };

            let kind = match fragment.kind {
                FragmentKind::Close(frame) => {
                    self.buffer.clear();
                    return Ok(Reassembled::Closed(frame));
                }
                FragmentKind::Text => MessageKind::Text,
                FragmentKind::Binary => MessageKind::Binary,
            };
            let kind = *message_kind.get_or_insert(kind);

            match overflow.as_mut() {
                Some(size) => *size += fragment.data.len(),
                None => {
                    let size = self.buffer.len() + fragment.data.len();
                    if size > self.max_message_size {
                        overflow = Some(size);
                        self.buffer.clear();
                    } else {
                        self.buffer.extend_from_slice(&fragment.data);
                    }
                }
            }

            if fragment.end_of_message {
                if let Some(size) = overflow {
                    return Err(ReassemblyError::Oversized {
                        size,
                        limit: self.max_message_size,
                    });
                }
                return Ok(Reassembled::Message {
                    kind,
                    payload: self.buffer.split().freeze(),
                });
            }
        }
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_READ_BUFFER_SIZE)
    }
}
