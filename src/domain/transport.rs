//! Boundary between a managed connection and the real socket beneath it.
//!
//! A [`Connector`] produces a [`Transport`] (the write half: send and
//! close) together with an [`InboundEvents`] stream (the read half). The
//! host pumps the stream into
//! [`ManagedConnection::on_transport_event`](super::ManagedConnection::on_transport_event),
//! one event per turn.

use serde::Serialize;
use tokio::sync::mpsc;

use super::Address;

/// Body of a single WebSocket data frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Payload {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
}

impl Payload {
    /// Size of the frame body in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    /// Returns `true` for an empty frame body.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Binary(bytes)
    }
}

/// Event type names a real socket can report.
pub const TRANSPORT_EVENT_KINDS: [&str; 4] = ["open", "message", "close", "error"];

/// Close code reported when the transport vanished without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Something the real socket reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake completed.
    Open,
    /// A data frame arrived.
    Message(Payload),
    /// The transport closed.
    Close {
        /// Close code from the peer, or [`ABNORMAL_CLOSURE`].
        code: u16,
        /// Close reason from the peer.
        reason: String,
    },
    /// The transport failed; a `Close` follows.
    Error(String),
}

impl TransportEvent {
    /// Event type name used for listener dispatch.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Message(_) => "message",
            Self::Close { .. } => "close",
            Self::Error(_) => "error",
        }
    }
}

/// Write half of a real socket.
///
/// Implementations must not call back into the owning connection
/// synchronously; inbound traffic travels through [`InboundEvents`].
pub trait Transport {
    /// Forwards one frame to the peer.
    fn send(&mut self, payload: Payload);

    /// Starts the closing handshake.
    fn close(&mut self, code: Option<u16>, reason: Option<String>);
}

/// Read half of a real socket.
pub type InboundEvents = mpsc::UnboundedReceiver<TransportEvent>;

/// Opens real sockets.
///
/// The returned transport accepts frames right away; handshake outcome is
/// reported later through the inbound stream (`open`, or `error` followed by
/// `close`).
pub trait Connector {
    /// Opens a socket to `address`, offering `protocols` as sub-protocols.
    fn connect(&self, address: &Address, protocols: &[String])
    -> (Box<dyn Transport>, InboundEvents);
}
