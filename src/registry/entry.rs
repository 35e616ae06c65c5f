//! Connection handles and registry state types
//!
//! A [`ConnectionHandle`] is the registry-visible side of one connection. It
//! owns the sending half of the connection's outbound queue; the writer task
//! holds the receiving half.
//!
//! Relayed frames are ordered per connection: the fan-out reserves a
//! [`RelayTicket`] for every subscriber in publisher order, and a delivery
//! only enqueues once every earlier ticket on that handle has been served.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{mpsc, watch};

use crate::protocol::{CloseFrame, Outbound};

use super::role::Role;

/// State of a connection as seen by the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Accepting application messages
    Open = 0,
    /// Close handshake started
    Closing = 1,
    /// Torn down
    Closed = 2,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Open,
            1 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

/// Failure to enqueue an outbound frame
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("connection is not open")]
    NotOpen,

    #[error("outbound queue full for {0:?}")]
    Timeout(Duration),

    #[error("writer has stopped")]
    QueueClosed,
}

/// Registry-visible reference to one connection
#[derive(Debug)]
pub struct ConnectionHandle {
    id: u64,
    role: Role,
    peer: SocketAddr,
    tx: mpsc::Sender<Outbound>,
    state: AtomicU8,
    delivered: AtomicU64,
    failed: AtomicU64,
    connected_at: Instant,
    /// Next relay ticket to hand out
    relay_next: AtomicU64,
    /// Ticket currently allowed to enqueue
    relay_turn: watch::Sender<u64>,
}

/// Place of one relayed frame in a connection's delivery order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RelayTicket(u64);

/// Hands the turn to the next ticket when dropped
struct RelayTurn<'a> {
    turn: &'a watch::Sender<u64>,
}

impl Drop for RelayTurn<'_> {
    fn drop(&mut self) {
        self.turn.send_modify(|current| *current += 1);
    }
}

impl ConnectionHandle {
    /// Create a handle feeding `tx`
    pub fn new(id: u64, role: Role, peer: SocketAddr, tx: mpsc::Sender<Outbound>) -> Self {
        Self {
            id,
            role,
            peer,
            tx,
            state: AtomicU8::new(ConnectionState::Open as u8),
            delivered: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            connected_at: Instant::now(),
            relay_next: AtomicU64::new(0),
            relay_turn: watch::channel(0).0,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Open and the writer is still draining the queue
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open && !self.tx.is_closed()
    }

    /// Move Open -> Closing. Returns false if already closing or closed.
    pub fn mark_closing(&self) -> bool {
        self.state
            .compare_exchange(
                ConnectionState::Open as u8,
                ConnectionState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub fn mark_closed(&self) {
        self.state
            .store(ConnectionState::Closed as u8, Ordering::Release);
    }

    /// Enqueue a text frame, waiting at most `timeout` for queue space
    pub async fn send(&self, payload: bytes::Bytes, timeout: Duration) -> Result<(), SendError> {
        if self.state() != ConnectionState::Open {
            return Err(SendError::NotOpen);
        }
        self.enqueue(Outbound::Text(payload), timeout).await
    }

    /// Enqueue a close frame; allowed while Open or Closing
    pub async fn send_close(
        &self,
        frame: Option<CloseFrame>,
        timeout: Duration,
    ) -> Result<(), SendError> {
        if self.state() == ConnectionState::Closed {
            return Err(SendError::NotOpen);
        }
        self.enqueue(Outbound::Close(frame), timeout).await
    }

    /// Reserve the next place in this connection's relay order
    ///
    /// Every reserved ticket must be passed to [`send_relayed`]; later
    /// tickets wait for it.
    ///
    /// [`send_relayed`]: ConnectionHandle::send_relayed
    pub fn reserve_relay(&self) -> RelayTicket {
        RelayTicket(self.relay_next.fetch_add(1, Ordering::AcqRel))
    }

    /// Enqueue a relayed frame once every earlier ticket has been served
    ///
    /// `timeout` counts from `reserved_at`, so time spent behind earlier
    /// frames is part of the budget. A frame whose budget is spent by the
    /// time its turn comes fails without touching the queue.
    pub async fn send_relayed(
        &self,
        ticket: RelayTicket,
        payload: bytes::Bytes,
        reserved_at: Instant,
        timeout: Duration,
    ) -> Result<(), SendError> {
        let _turn = self.wait_relay_turn(ticket).await;

        if !self.is_open() {
            return Err(SendError::NotOpen);
        }

        let remaining = (reserved_at + timeout).saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            self.failed.fetch_add(1, Ordering::Relaxed);
            return Err(SendError::Timeout(timeout));
        }

        self.enqueue(Outbound::Text(payload), remaining)
            .await
            .map_err(|e| match e {
                SendError::Timeout(_) => SendError::Timeout(timeout),
                other => other,
            })
    }

    async fn wait_relay_turn(&self, ticket: RelayTicket) -> RelayTurn<'_> {
        let mut turn = self.relay_turn.subscribe();
        // The sender lives as long as `self`, so this only returns once the
        // turn has come
        let _ = turn.wait_for(|current| *current >= ticket.0).await;
        RelayTurn {
            turn: &self.relay_turn,
        }
    }

    async fn enqueue(&self, outbound: Outbound, timeout: Duration) -> Result<(), SendError> {
        let result = match self.tx.send_timeout(outbound, timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(SendError::Timeout(timeout)),
            Err(SendTimeoutError::Closed(_)) => Err(SendError::QueueClosed),
        };

        match result {
            Ok(()) => self.delivered.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.failed.fetch_add(1, Ordering::Relaxed),
        };
        result
    }

    /// Frames successfully queued
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Frames that could not be queued
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn connected_for(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

/// Statistics for the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryStats {
    /// Session id holding the publisher slot
    pub publisher_id: Option<u64>,
    /// Number of registered subscribers
    pub subscriber_count: usize,
    /// Subscribers whose connection is no longer open
    pub stale_subscribers: usize,
}
