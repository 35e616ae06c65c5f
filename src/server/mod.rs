//! Relay server
//!
//! This module provides:
//! - The listener and shutdown coordination
//! - HTTP routes with upgrade validation
//! - The WebSocket transport adapter
//! - Publisher credential checks

pub mod auth;
pub mod config;
pub mod handler;
pub mod listener;
pub mod ws;

pub use auth::{CredentialStore, StaticToken};
pub use config::ServerConfig;
pub use handler::{router, RelayState, StreamQuery};
pub use listener::RelayServer;
pub use ws::{spawn_writer, WsFragmentReader};
