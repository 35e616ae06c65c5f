//! Connection roles
//!
//! A connection's role is chosen from the `socket_type` query parameter at
//! upgrade time and never changes afterwards.

use crate::protocol::constants::{SOCKET_TYPE_PUBLISHER, SOCKET_TYPE_SUBSCRIBER};

/// Role a connection holds for its whole lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// The single connection allowed to originate images
    Publisher,
    /// Receives every image the publisher sends
    Subscriber,
}

impl Role {
    /// Map a `socket_type` value (1 = subscriber, 2 = publisher)
    pub fn from_socket_type(value: u8) -> Option<Self> {
        match value {
            SOCKET_TYPE_SUBSCRIBER => Some(Role::Subscriber),
            SOCKET_TYPE_PUBLISHER => Some(Role::Publisher),
            _ => None,
        }
    }

    /// The `socket_type` value for this role
    pub fn socket_type(&self) -> u8 {
        match self {
            Role::Subscriber => SOCKET_TYPE_SUBSCRIBER,
            Role::Publisher => SOCKET_TYPE_PUBLISHER,
        }
    }

    pub fn is_publisher(&self) -> bool {
        matches!(self, Role::Publisher)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Publisher => "PUBLISHER",
            Role::Subscriber => "SUBSCRIBER",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
