//! Protocol constants

use std::time::Duration;

/// Upgrade endpoint path
pub const STREAM_PATH: &str = "/api/stream/ws";

/// Health endpoint path
pub const HEALTH_PATH: &str = "/health";

// Values of the `socket_type` query parameter
pub const SOCKET_TYPE_SUBSCRIBER: u8 = 1;
pub const SOCKET_TYPE_PUBLISHER: u8 = 2;

// WebSocket close codes (RFC 6455 section 7.4.1)
pub const CLOSE_NORMAL: u16 = 1000;
pub const CLOSE_GOING_AWAY: u16 = 1001;
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// Default bound on a reassembled logical message (1 MiB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Default transport-level frame/message cap (16 MiB)
pub const DEFAULT_TRANSPORT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Default fragment read capacity (64 KiB)
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Default outbound queue depth per connection
pub const DEFAULT_OUTBOUND_QUEUE: usize = 64;

pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_ADMISSION_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

// Envelope keys
pub const KEY_TYPE: &str = "type";
pub const KEY_STATUS: &str = "status";
pub const KEY_MESSAGE: &str = "message";
pub const KEY_IMAGE: &str = "image";

// Reply messages
pub const MSG_PONG: &str = "pong";
pub const MSG_IMAGE_RECEIVED: &str = "Image received.";
pub const MSG_TYPE_REQUIRED: &str = "a valid type is required";
pub const MSG_IMAGE_REQUIRED: &str = "an image payload is required";
pub const MSG_PUBLISHER_ONLY: &str = "only the publisher may send images";
pub const MSG_NOT_PROCESSED: &str = "the message could not be processed";
