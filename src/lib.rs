//! Single-publisher image relay over WebSocket
//!
//! One authenticated publisher pushes base64 images as JSON envelopes and
//! every connected subscriber receives them verbatim. The server also
//! answers `PING`, reassembles fragmented messages under a size bound, and
//! Huffman-codes each image it accepts.
//!
//! ```no_run
//! use image_relay::server::{RelayServer, ServerConfig, StaticToken};
//!
//! # async fn example() -> image_relay::error::Result<()> {
//! let server = RelayServer::new(ServerConfig::default(), StaticToken::new("secret"));
//! server.run_until(async {
//!     let _ = tokio::signal::ctrl_c().await;
//! }).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod media;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod stats;

pub use error::{Error, Result};
pub use media::{HuffmanError, HuffmanTable};
pub use protocol::{CloseFrame, Envelope, MessageType, Response, Status};
pub use registry::{Role, RoleRegistry};
pub use server::{CredentialStore, RelayServer, ServerConfig, StaticToken};
