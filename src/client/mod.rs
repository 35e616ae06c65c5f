//! Relay client
//!
//! Provides client-side access for:
//! - Publishing images as the single publisher
//! - Subscribing to the relayed stream

pub mod config;
pub mod connector;
pub mod publisher;
pub mod subscriber;

pub use config::ClientConfig;
pub use connector::RelayConnector;
pub use publisher::{image_envelope, PublishEvent, RelayPublisher};
pub use subscriber::RelaySubscriber;
