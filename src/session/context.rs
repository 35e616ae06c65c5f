//! Session context
//!
//! Read-only session information handed to the dispatcher.

use std::net::SocketAddr;

use crate::registry::Role;

/// Context passed to dispatcher calls
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Unique session ID
    pub session_id: u64,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// Role fixed at admission
    pub role: Role,
}

impl SessionContext {
    /// Create a new context
    pub fn new(session_id: u64, peer_addr: SocketAddr, role: Role) -> Self {
        Self {
            session_id,
            peer_addr,
            role,
        }
    }

    pub fn is_publisher(&self) -> bool {
        self.role.is_publisher()
    }
}
