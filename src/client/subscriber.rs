//! Relay image subscriber

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::error::{Error, Result};
use crate::protocol::constants::*;
use crate::protocol::Envelope;
use crate::registry::Role;

use super::config::ClientConfig;
use super::connector::RelayConnector;

/// Receives the publisher's relayed envelopes
pub struct RelaySubscriber {
    connector: RelayConnector,
}

impl RelaySubscriber {
    /// Connect as a subscriber
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let connector = RelayConnector::connect(config, Role::Subscriber).await?;
        Ok(Self { connector })
    }

    /// Next relayed envelope, exactly as the publisher sent it
    pub async fn next_envelope(&mut self) -> Result<Envelope> {
        self.connector.next_envelope().await
    }

    /// Next relayed image, decoded from base64
    pub async fn next_image(&mut self) -> Result<Vec<u8>> {
        let envelope = self.next_envelope().await?;
        match envelope.get_str(KEY_IMAGE) {
            Some(image) => Ok(STANDARD.decode(image)?),
            None => Err(Error::UnexpectedReply(format!(
                "envelope without an image: {:?}",
                envelope.keys().collect::<Vec<_>>()
            ))),
        }
    }

    /// Send an envelope; the server answers subscribers like any other peer
    pub async fn send_envelope(&mut self, envelope: &Envelope) -> Result<()> {
        self.connector.send_envelope(envelope).await
    }

    pub async fn close(self) -> Result<()> {
        self.connector.close().await
    }
}
