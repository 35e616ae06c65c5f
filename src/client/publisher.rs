//! Relay image publisher
//!
//! High-level API for pushing images to a relay server as the single
//! publisher.

use base64::{engine::general_purpose::STANDARD, Engine};
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::protocol::constants::*;
use crate::protocol::{Envelope, MessageType, Status};
use crate::registry::Role;

use super::config::ClientConfig;
use super::connector::RelayConnector;

/// Events from the relay publisher
#[derive(Debug)]
pub enum PublishEvent {
    /// Connected and holding the publisher slot
    Connected,

    /// An image was acknowledged by the server
    ImageAccepted,

    /// Error occurred
    Error(String),

    /// Disconnected
    Disconnected,
}

/// Relay image publisher
///
/// # Example
/// ```no_run
/// use image_relay::client::{ClientConfig, RelayPublisher};
///
/// # async fn example() -> image_relay::error::Result<()> {
/// let config = ClientConfig::new("ws://localhost:8080").token("secret");
/// let (mut publisher, mut events) = RelayPublisher::new(config);
///
/// tokio::spawn(async move {
///     while let Some(event) = events.recv().await {
///         println!("Event: {:?}", event);
///     }
/// });
///
/// publisher.connect().await?;
/// publisher.publish(b"\x89PNG...").await?;
/// # Ok(())
/// # }
/// ```
pub struct RelayPublisher {
    config: ClientConfig,
    event_tx: mpsc::Sender<PublishEvent>,
    connector: Option<RelayConnector>,
}

/// Build an IMAGE envelope carrying `image` as base64
pub fn image_envelope(image: &[u8]) -> Envelope {
    let mut envelope = Envelope::new();
    envelope.insert(KEY_TYPE, MessageType::Image.as_str());
    envelope.insert(KEY_IMAGE, STANDARD.encode(image));
    envelope
}

impl RelayPublisher {
    /// Create a new publisher.
    ///
    /// Returns the publisher and a receiver for events.
    pub fn new(config: ClientConfig) -> (Self, mpsc::Receiver<PublishEvent>) {
        let (tx, rx) = mpsc::channel(256);

        let publisher = Self {
            config,
            event_tx: tx,
            connector: None,
        };

        (publisher, rx)
    }

    /// Connect and take the publisher slot.
    ///
    /// The server admits the publisher after the upgrade, so losing the
    /// slot to another publisher shows up as a 1008 close on the first
    /// read rather than here.
    pub async fn connect(&mut self) -> Result<()> {
        let connector = RelayConnector::connect(self.config.clone(), Role::Publisher).await?;
        let _ = self.event_tx.send(PublishEvent::Connected).await;

        self.connector = Some(connector);
        Ok(())
    }

    fn connector(&mut self) -> Result<&mut RelayConnector> {
        self.connector
            .as_mut()
            .ok_or_else(|| Error::UnexpectedReply("not connected".into()))
    }

    /// Send an image without waiting for the acknowledgement
    pub async fn send_image(&mut self, image: &[u8]) -> Result<()> {
        let envelope = image_envelope(image);
        self.connector()?.send_envelope(&envelope).await
    }

    /// Send an image and wait for the server to acknowledge it
    pub async fn publish(&mut self, image: &[u8]) -> Result<Envelope> {
        self.send_image(image).await?;

        let reply = self.next_reply().await?;
        if reply.status() == Some(Status::Ok) && reply.get_str(KEY_MESSAGE) == Some(MSG_IMAGE_RECEIVED) {
            let _ = self.event_tx.send(PublishEvent::ImageAccepted).await;
            return Ok(reply);
        }

        let message = reply.get_str(KEY_MESSAGE).unwrap_or_default().to_string();
        let _ = self.event_tx.send(PublishEvent::Error(message.clone())).await;
        Err(Error::UnexpectedReply(message))
    }

    /// Round-trip a PING
    pub async fn ping(&mut self) -> Result<Envelope> {
        let mut envelope = Envelope::new();
        envelope.insert(KEY_TYPE, MessageType::Ping.as_str());
        self.send_envelope(&envelope).await?;

        let reply = self.next_reply().await?;
        match reply.get_str(KEY_MESSAGE) {
            Some(MSG_PONG) => Ok(reply),
            other => Err(Error::UnexpectedReply(other.unwrap_or_default().to_string())),
        }
    }

    /// Send an arbitrary envelope
    pub async fn send_envelope(&mut self, envelope: &Envelope) -> Result<()> {
        self.connector()?.send_envelope(envelope).await
    }

    /// Next reply from the server
    pub async fn next_reply(&mut self) -> Result<Envelope> {
        let result = self.connector()?.next_envelope().await;
        if let Err(Error::Closed(_)) = result {
            self.connector.take();
            let _ = self.event_tx.send(PublishEvent::Disconnected).await;
        }
        result
    }

    /// Disconnect from the server.
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(connector) = self.connector.take() {
            connector.close().await?;
            let _ = self.event_tx.send(PublishEvent::Disconnected).await;
        }
        Ok(())
    }

    /// Check if currently connected.
    pub fn is_connected(&self) -> bool {
        self.connector.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_envelope() {
        let envelope = image_envelope(b"hello");
        let keys: Vec<&str> = envelope.keys().collect();

        assert_eq!(keys, vec!["type", "image"]);
        assert_eq!(envelope.get_str(KEY_TYPE), Some("IMAGE"));
        assert_eq!(envelope.get_str(KEY_IMAGE), Some("aGVsbG8="));
    }

    #[tokio::test]
    async fn test_not_connected() {
        let (mut publisher, _events) = RelayPublisher::new(ClientConfig::new("ws://localhost:1"));

        assert!(!publisher.is_connected());
        let err = publisher.send_image(b"x").await.unwrap_err();
        assert!(matches!(err, Error::UnexpectedReply(_)));
        publisher.disconnect().await.unwrap();
    }
}
