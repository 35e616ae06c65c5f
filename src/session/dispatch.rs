//! Envelope dispatch
//!
//! Turns one reassembled text message into at most one reply for the sender
//! and, for images from the publisher, a payload to relay.
//!
//! | `type`          | sender      | reply                                   | relay |
//! |-----------------|-------------|-----------------------------------------|-------|
//! | absent / empty  | any         | none (dropped)                          | no    |
//! | unknown         | any         | `ERROR` "a valid type is required"      | no    |
//! | `PING`          | any         | `OK` "pong"                             | no    |
//! | `IMAGE`         | publisher   | `OK` `IMAGE` "Image received."          | yes   |
//! | `IMAGE`         | subscriber  | `ERROR` "only the publisher ..."        | no    |
//!
//! The relayed payload is the original envelope text exactly as received.

use std::sync::Arc;

use bytes::Bytes;
use tokio::task::JoinHandle;

use crate::media::{HuffmanError, HuffmanTable};
use crate::protocol::constants::{MSG_IMAGE_REQUIRED, MSG_PUBLISHER_ONLY, MSG_TYPE_REQUIRED};
use crate::protocol::{Envelope, Inbound, MessageType, Response, Status, TypeError};
use crate::registry::{Broadcaster, FanoutReport, RoleRegistry};
use crate::stats::RelayStats;

use super::context::SessionContext;

/// Result of envelope validation
#[derive(Debug)]
pub enum Validated {
    /// Known type, ready for dispatch
    Message(Inbound),
    /// Rejected with a reply
    Reply(Envelope),
    /// Dropped without a reply
    Dropped,
}

/// What the session should do after one message
#[derive(Debug, Default)]
pub struct Outcome {
    /// Reply for the sender
    pub reply: Option<Envelope>,
    /// Envelope text to fan out to subscribers
    pub relay: Option<Bytes>,
}

impl Outcome {
    fn reply(response: Response) -> Self {
        Self {
            reply: Some(response.to_envelope()),
            relay: None,
        }
    }

    /// Whether the reply reports an error
    pub fn is_error(&self) -> bool {
        self.reply.as_ref().and_then(Envelope::status) == Some(Status::Error)
    }
}

/// Replace a reply that lacks a usable `status` with a generic error
pub fn ensure_status(reply: Envelope) -> Envelope {
    if reply.status().is_some() {
        reply
    } else {
        tracing::warn!(keys = reply.len(), "Reply without status replaced");
        Response::not_processed().to_envelope()
    }
}

/// Shared envelope dispatcher
pub struct Dispatcher {
    registry: Arc<RoleRegistry>,
    broadcaster: Broadcaster,
    stats: Arc<RelayStats>,
}

impl Dispatcher {
    pub fn new(registry: Arc<RoleRegistry>, broadcaster: Broadcaster, stats: Arc<RelayStats>) -> Self {
        Self {
            registry,
            broadcaster,
            stats,
        }
    }

    pub fn stats(&self) -> &Arc<RelayStats> {
        &self.stats
    }

    /// Decode `raw` and check its `type`
    pub fn validate(&self, ctx: &SessionContext, raw: &[u8]) -> Validated {
        let envelope = match Envelope::decode(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(session_id = ctx.session_id, error = %e, "Undecodable envelope");
                self.stats.record_protocol_error();
                return Validated::Reply(Response::error(e.to_string()).to_envelope());
            }
        };

        match Inbound::from_envelope(envelope) {
            Ok(inbound) => Validated::Message(inbound),
            Err(TypeError::Missing) | Err(TypeError::Empty) => {
                tracing::warn!(
                    session_id = ctx.session_id,
                    "Envelope without type dropped"
                );
                Validated::Dropped
            }
            Err(TypeError::Unrecognized(value)) => {
                tracing::warn!(
                    session_id = ctx.session_id,
                    message_type = %value,
                    "Unrecognized envelope type"
                );
                self.stats.record_protocol_error();
                Validated::Reply(Response::error(MSG_TYPE_REQUIRED).to_envelope())
            }
        }
    }

    /// Run the handler for a validated envelope
    ///
    /// `raw` is the envelope text as received, relayed unchanged.
    pub async fn dispatch(&self, ctx: &SessionContext, inbound: Inbound, raw: Bytes) -> Outcome {
        let mut outcome = match inbound.message_type {
            MessageType::Ping => Outcome::reply(Response::Pong),
            MessageType::Image => self.on_image(ctx, &inbound, raw).await,
        };

        outcome.reply = outcome.reply.map(ensure_status);
        if outcome.is_error() {
            self.stats.record_protocol_error();
        }
        outcome
    }

    /// Validate and dispatch in one step
    pub async fn handle(&self, ctx: &SessionContext, raw: Bytes) -> Outcome {
        match self.validate(ctx, &raw) {
            Validated::Message(inbound) => self.dispatch(ctx, inbound, raw).await,
            Validated::Reply(reply) => Outcome {
                reply: Some(ensure_status(reply)),
                relay: None,
            },
            Validated::Dropped => Outcome::default(),
        }
    }

    /// Fan `payload` out to the current subscriber snapshot
    ///
    /// The returned handle may be dropped; delivery continues regardless.
    pub async fn relay(&self, payload: Bytes) -> JoinHandle<FanoutReport> {
        let subscribers = self.registry.snapshot().await;
        self.broadcaster.fan_out(payload, subscribers)
    }

    async fn on_image(&self, ctx: &SessionContext, inbound: &Inbound, raw: Bytes) -> Outcome {
        if !ctx.is_publisher() {
            tracing::warn!(
                session_id = ctx.session_id,
                role = %ctx.role,
                "Image from non-publisher rejected"
            );
            return Outcome::reply(Response::error(MSG_PUBLISHER_ONLY));
        }

        let image = match inbound.image() {
            Some(image) if !image.is_empty() => Bytes::copy_from_slice(image.as_bytes()),
            _ => return Outcome::reply(Response::error(MSG_IMAGE_REQUIRED)),
        };
        let image_len = image.len();

        let encoded = tokio::task::spawn_blocking(move || encode_image(&image)).await;
        let encoded_len = match encoded {
            Ok(Ok(encoded)) => encoded.len(),
            Ok(Err(e)) => {
                tracing::warn!(session_id = ctx.session_id, error = %e, "Image coding failed");
                return Outcome::reply(Response::ImageError {
                    message: e.to_string(),
                });
            }
            Err(e) => {
                tracing::error!(session_id = ctx.session_id, error = %e, "Image coding task failed");
                return Outcome::reply(Response::ImageError {
                    message: "image coding task failed".into(),
                });
            }
        };

        self.stats.record_image(image_len, encoded_len);
        tracing::debug!(
            session_id = ctx.session_id,
            size = image_len,
            encoded = encoded_len,
            "Image received"
        );

        Outcome {
            reply: Some(Response::ImageReceived.to_envelope()),
            relay: Some(raw),
        }
    }
}

/// Build a table from the image text and code it
fn encode_image(image: &[u8]) -> Result<Vec<u8>, HuffmanError> {
    HuffmanTable::build(image)?.encode(image)
}
