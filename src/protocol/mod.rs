//! Relay wire protocol
//!
//! This module provides:
//! - Wire fragments and the `FragmentSource` read seam
//! - The JSON command envelope and reply variants
//! - Endpoint paths, close codes, keys and default limits

pub mod constants;
pub mod envelope;
pub mod fragment;

pub use envelope::{Envelope, EnvelopeError, Inbound, MessageType, Response, Status, TypeError};
pub use fragment::{
    CloseFrame, Fragment, FragmentKind, FragmentSource, MessageKind, Outbound, TransportError,
};
