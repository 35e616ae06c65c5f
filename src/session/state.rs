//! Session state machine
//!
//! Tracks one connection from admission to teardown:
//!
//! ```text
//! Admitted ──► Open ──► Validating ──► Dispatching ──┐
//!               ▲                                    │
//!               └────────────── next message ◄───────┘
//!               │
//!               └──► Closing ──► Closed
//! ```

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::protocol::CloseFrame;
use crate::registry::Role;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Role granted by the registry, loop not started
    Admitted,
    /// Waiting for the next logical message
    Open,
    /// Decoding and checking an envelope
    Validating,
    /// Running the handler for a validated envelope
    Dispatching,
    /// Close handshake in progress
    Closing,
    /// Torn down
    Closed,
}

/// Complete session state
#[derive(Debug)]
pub struct SessionState {
    /// Unique session ID
    pub id: u64,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// Role fixed at admission
    pub role: Role,

    /// Current phase
    pub phase: SessionPhase,

    /// Admission time
    pub admitted_at: Instant,

    /// Close frame received from the peer, if any
    pub peer_close: Option<CloseFrame>,
}

impl SessionState {
    /// Create a new session state
    pub fn new(id: u64, peer_addr: SocketAddr, role: Role) -> Self {
        Self {
            id,
            peer_addr,
            role,
            phase: SessionPhase::Admitted,
            admitted_at: Instant::now(),
            peer_close: None,
        }
    }

    /// Start the read loop
    pub fn open(&mut self) {
        if self.phase == SessionPhase::Admitted {
            self.phase = SessionPhase::Open;
        }
    }

    pub fn begin_validating(&mut self) {
        if self.phase == SessionPhase::Open {
            self.phase = SessionPhase::Validating;
        }
    }

    pub fn begin_dispatching(&mut self) {
        if self.phase == SessionPhase::Validating {
            self.phase = SessionPhase::Dispatching;
        }
    }

    /// Return to Open after a message has been handled
    pub fn message_done(&mut self) {
        if matches!(
            self.phase,
            SessionPhase::Validating | SessionPhase::Dispatching
        ) {
            self.phase = SessionPhase::Open;
        }
    }

    /// Start closing the session
    pub fn close(&mut self) {
        if self.phase != SessionPhase::Closed {
            self.phase = SessionPhase::Closing;
        }
    }

    pub fn mark_closed(&mut self) {
        self.phase = SessionPhase::Closed;
    }

    /// Check if the session accepts messages
    pub fn is_open(&self) -> bool {
        matches!(
            self.phase,
            SessionPhase::Open | SessionPhase::Validating | SessionPhase::Dispatching
        )
    }

    /// Get session duration
    pub fn duration(&self) -> Duration {
        self.admitted_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn state() -> SessionState {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080);
        SessionState::new(1, addr, Role::Publisher)
    }

    #[test]
    fn test_session_lifecycle() {
        let mut state = state();
        assert_eq!(state.phase, SessionPhase::Admitted);
        assert!(!state.is_open());

        state.open();
        assert_eq!(state.phase, SessionPhase::Open);

        state.begin_validating();
        assert_eq!(state.phase, SessionPhase::Validating);

        state.begin_dispatching();
        assert_eq!(state.phase, SessionPhase::Dispatching);
        assert!(state.is_open());

        state.message_done();
        assert_eq!(state.phase, SessionPhase::Open);

        state.close();
        assert_eq!(state.phase, SessionPhase::Closing);
        assert!(!state.is_open());

        state.mark_closed();
        assert_eq!(state.phase, SessionPhase::Closed);
    }

    #[test]
    fn test_out_of_order_transitions_ignored() {
        let mut state = state();

        state.begin_dispatching();
        assert_eq!(state.phase, SessionPhase::Admitted);

        state.open();
        state.begin_dispatching();
        assert_eq!(state.phase, SessionPhase::Open);

        state.mark_closed();
        state.close();
        assert_eq!(state.phase, SessionPhase::Closed);
    }
}
