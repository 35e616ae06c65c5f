//! Low-level relay connection
//!
//! Owns one WebSocket and speaks envelopes over it. Control frames are
//! answered by tungstenite and never surface here.

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::{Error, Result};
use crate::protocol::{CloseFrame, Envelope};
use crate::registry::Role;

use super::config::ClientConfig;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One connection to a relay server in a fixed role
pub struct RelayConnector {
    socket: Socket,
    config: ClientConfig,
    role: Role,
}

impl RelayConnector {
    /// Open the upgrade for `role`
    ///
    /// An HTTP rejection of the upgrade surfaces as [`Error::Rejected`].
    pub async fn connect(config: ClientConfig, role: Role) -> Result<Self> {
        let url = config.stream_url(role)?;
        tracing::debug!(url = %url, role = %role, "Connecting to relay");

        let socket = match tokio::time::timeout(config.connect_timeout, connect_async(url.as_str())).await {
            Err(_) => return Err(Error::Timeout("connect")),
            Ok(Err(tungstenite::Error::Http(response))) => {
                return Err(Error::Rejected {
                    status: response.status().as_u16(),
                })
            }
            Ok(Err(e)) => return Err(e.into()),
            Ok(Ok((socket, _response))) => socket,
        };

        tracing::debug!(role = %role, "Connected");
        Ok(Self {
            socket,
            config,
            role,
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Send one envelope as a text message
    pub async fn send_envelope(&mut self, envelope: &Envelope) -> Result<()> {
        let text = serde_json::to_string(&envelope.clone().into_inner())?;
        self.send_text(text).await
    }

    /// Send raw text, valid JSON or not
    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<()> {
        self.socket.send(Message::text(text.into())).await?;
        Ok(())
    }

    /// Next envelope from the server
    ///
    /// A close frame ends the connection with [`Error::Closed`].
    pub async fn next_envelope(&mut self) -> Result<Envelope> {
        loop {
            let message = match tokio::time::timeout(self.config.reply_timeout, self.socket.next()).await {
                Err(_) => return Err(Error::Timeout("reply")),
                Ok(None) => return Err(Error::Closed(None)),
                Ok(Some(message)) => message?,
            };

            match message {
                Message::Text(text) => return Ok(Envelope::decode(text.as_bytes())?),
                Message::Binary(data) => return Ok(Envelope::decode(&data)?),
                Message::Close(frame) => {
                    let frame = frame.map(|f| CloseFrame::new(u16::from(f.code), f.reason.as_str()));
                    return Err(Error::Closed(frame));
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    /// Close with 1000 and wait for the server's close frame
    pub async fn close(mut self) -> Result<()> {
        match self.socket.close(None).await {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed)
            | Err(tungstenite::Error::AlreadyClosed) => {}
            Err(e) => return Err(e.into()),
        }

        let drain = async {
            while let Some(message) = self.socket.next().await {
                if message.is_err() {
                    break;
                }
            }
        };
        if tokio::time::timeout(self.config.reply_timeout, drain).await.is_err() {
            tracing::debug!("Server did not finish the close handshake");
        }
        Ok(())
    }
}
