//! Role registry and fan-out
//!
//! The registry tracks which connection holds the publisher slot and which
//! connections are subscribers. Publisher sessions take a snapshot of the
//! subscriber set and hand it to the [`Broadcaster`], which queues the
//! relayed envelope on every subscriber's outbound channel.
//!
//! # Architecture
//!
//! ```text
//!                          Arc<RoleRegistry>
//!                     ┌─────────────────────────┐
//!                     │ publisher: Option<      │
//!                     │   Arc<ConnectionHandle>>│
//!                     │ subscribers: BTreeMap<  │
//!                     │   id, Arc<Handle>>      │
//!                     └───────────┬─────────────┘
//!                                 │ snapshot()
//!         ┌───────────────────────┼───────────────────────┐
//!         │                       │                       │
//!         ▼                       ▼                       ▼
//!    [Publisher]            [Subscriber]            [Subscriber]
//!    IMAGE received          mpsc queue              mpsc queue
//!         │                       │                       │
//!         └──► Broadcaster::fan_out() ──► writer task ──► WebSocket
//! ```
//!
//! # Zero-Copy Design
//!
//! `bytes::Bytes` uses reference counting, so all subscribers share the same
//! payload allocation.

pub mod broadcast;
pub mod config;
pub mod entry;
pub mod error;
pub mod role;
pub mod store;

pub use broadcast::{Broadcaster, FanoutReport};
pub use config::RegistryConfig;
pub use entry::{ConnectionHandle, ConnectionState, RegistryStats, RelayTicket, SendError};
pub use error::RegistryError;
pub use role::Role;
pub use store::RoleRegistry;
