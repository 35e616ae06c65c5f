//! JSON command envelope
//!
//! Every application message is a single JSON object. Key order is kept as
//! received (or as inserted) so relayed and encoded envelopes read the way
//! they were written.
//!
//! Inbound envelopes are checked into an [`Inbound`] with a known
//! [`MessageType`]; the full map stays attached so extra fields survive.
//! Outbound replies are built from the [`Response`] variants.

use bytes::Bytes;
use serde_json::{Map, Value};
use thiserror::Error;

use super::constants::*;

/// Envelope codec errors
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("invalid JSON: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("envelope must be a JSON object")]
    NotAnObject,

    #[error("refusing to encode an empty envelope")]
    Empty,

    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Insertion-ordered string-keyed map of JSON values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Envelope(Map<String, Value>);

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one JSON object from `bytes`
    pub fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        match serde_json::from_slice(bytes).map_err(EnvelopeError::Malformed)? {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(EnvelopeError::NotAnObject),
        }
    }

    /// Serialize to compact JSON
    pub fn encode(&self) -> Result<Bytes, EnvelopeError> {
        if self.0.is_empty() {
            return Err(EnvelopeError::Empty);
        }
        serde_json::to_vec(&self.0)
            .map(Bytes::from)
            .map_err(EnvelopeError::Encode)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String value of `key`, if present and a string
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Parsed `status` value, if any
    pub fn status(&self) -> Option<Status> {
        self.get_str(KEY_STATUS).and_then(Status::parse)
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Envelope {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Recognized values of the `type` key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Ping,
    Image,
}

impl MessageType {
    /// Case-insensitive match against the known types
    pub fn parse(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("PING") {
            Some(Self::Ping)
        } else if value.eq_ignore_ascii_case("IMAGE") {
            Some(Self::Image)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ping => "PING",
            Self::Image => "IMAGE",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reply status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Error,
}

impl Status {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "OK" => Some(Self::Ok),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Error => "ERROR",
        }
    }
}

/// Why an envelope's `type` was not usable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeError {
    /// No `type` key, or `type` is null
    Missing,
    /// `type` is an empty or blank string
    Empty,
    /// `type` holds something other than a known type
    Unrecognized(String),
}

/// A decoded envelope with a known type
#[derive(Debug, Clone)]
pub struct Inbound {
    pub message_type: MessageType,
    pub envelope: Envelope,
}

impl Inbound {
    /// Validate the `type` key of `envelope`
    pub fn from_envelope(envelope: Envelope) -> Result<Self, TypeError> {
        let message_type = match envelope.get(KEY_TYPE) {
            None | Some(Value::Null) => return Err(TypeError::Missing),
            Some(Value::String(s)) if s.trim().is_empty() => return Err(TypeError::Empty),
            Some(Value::String(s)) => {
                MessageType::parse(s.trim()).ok_or_else(|| TypeError::Unrecognized(s.clone()))?
            }
            Some(other) => return Err(TypeError::Unrecognized(other.to_string())),
        };

        Ok(Self {
            message_type,
            envelope,
        })
    }

    /// The `image` field, when it is a string
    pub fn image(&self) -> Option<&str> {
        self.envelope.get_str(KEY_IMAGE)
    }
}

/// Replies sent back to the originating connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// `{status: OK, message: "pong"}`
    Pong,
    /// `{status: OK, type: IMAGE, message: "Image received."}`
    ImageReceived,
    /// `{status: ERROR, message}`
    Error { message: String },
    /// `{status: ERROR, type: IMAGE, message}`
    ImageError { message: String },
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Generic reply for handlers that failed to produce a status
    pub fn not_processed() -> Self {
        Self::error(MSG_NOT_PROCESSED)
    }

    pub fn status(&self) -> Status {
        match self {
            Self::Pong | Self::ImageReceived => Status::Ok,
            Self::Error { .. } | Self::ImageError { .. } => Status::Error,
        }
    }

    pub fn to_envelope(&self) -> Envelope {
        let mut envelope = Envelope::new();
        envelope.insert(KEY_STATUS, self.status().as_str());

        match self {
            Self::Pong => {
                envelope.insert(KEY_MESSAGE, MSG_PONG);
            }
            Self::ImageReceived => {
                envelope.insert(KEY_TYPE, MessageType::Image.as_str());
                envelope.insert(KEY_MESSAGE, MSG_IMAGE_RECEIVED);
            }
            Self::Error { message } => {
                envelope.insert(KEY_MESSAGE, message.as_str());
            }
            Self::ImageError { message } => {
                envelope.insert(KEY_TYPE, MessageType::Image.as_str());
                envelope.insert(KEY_MESSAGE, message.as_str());
            }
        }

        envelope
    }
}
