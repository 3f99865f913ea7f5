//! Error types for the swarmproto protocol layer.
//!
//! Only [`ProtocolError`] ever reaches application code (from
//! [`send_request`](crate::Protocol::send_request)). Errors raised while
//! handling inbound traffic are logged and counted by the engine, never
//! surfaced.

use thiserror::Error;

use crate::routing::RoutingKey;
use crate::types::PeerId;

/// Errors from encoding or decoding a protocol envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    /// Input ended before the named field was complete.
    #[error("truncated envelope: need {needed} bytes for {field}, have {have}")]
    Truncated {
        /// Field being read.
        field: &'static str,
        /// Bytes required.
        needed: usize,
        /// Bytes remaining.
        have: usize,
    },

    /// Unknown envelope format version.
    #[error("unsupported envelope version: {0}")]
    UnsupportedVersion(u8),

    /// Response flag byte was neither 0 nor 1.
    #[error("invalid response flag: {0:#04x}")]
    InvalidFlag(u8),

    /// A string field was not valid UTF-8.
    #[error("invalid UTF-8 in {field}")]
    InvalidUtf8 {
        /// Field that failed to decode.
        field: &'static str,
    },

    /// The author signature was not valid hex.
    #[error("invalid signature encoding: {0}")]
    InvalidSignature(String),

    /// Bytes remained after the payload.
    #[error("{0} trailing bytes after envelope")]
    TrailingBytes(usize),

    /// Envelope exceeds the maximum wire size.
    #[error("envelope too large: {size} bytes (max {max})")]
    TooLarge {
        /// Actual size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// A field is too long to be length-prefixed.
    #[error("field {field} too long: {len} bytes")]
    FieldTooLong {
        /// Field name.
        field: &'static str,
        /// Field length.
        len: usize,
    },
}

/// Errors from the signing primitive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignerError {
    /// Signing the message failed.
    #[error("signing failed: {0}")]
    SigningFailed(String),

    /// Key material had the wrong length or encoding.
    #[error("invalid key material: {0}")]
    InvalidKey(String),
}

/// Errors from handing a message to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No peer with this id is known to the transport.
    #[error("unknown peer: {0}")]
    UnknownPeer(PeerId),

    /// The target peer has no handler registered for the routing key.
    #[error("peer {peer} has no handler for {protocol}")]
    NoHandler {
        /// Target peer.
        peer: PeerId,
        /// Protocol id carried in the envelope.
        protocol: String,
    },

    /// The target handler queue is full.
    #[error("handler queue full for {protocol} on {peer}")]
    QueueFull {
        /// Target peer.
        peer: PeerId,
        /// Protocol id carried in the envelope.
        protocol: String,
    },

    /// The target handler queue has been closed.
    #[error("handler for {protocol} on {peer} is closed")]
    Closed {
        /// Target peer.
        peer: PeerId,
        /// Protocol id carried in the envelope.
        protocol: String,
    },

    /// The payload does not carry a readable routing header.
    #[error("unroutable payload: {0}")]
    Unroutable(#[from] EnvelopeError),
}

/// Errors from parsing a routing key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingKeyError {
    /// Key does not match `/{protocol}/{version}/{method}/`.
    #[error("malformed routing key {0:?}: expected /protocol/version/method/")]
    Malformed(String),

    /// A segment was empty.
    #[error("empty {segment} segment in routing key")]
    EmptySegment {
        /// Segment name.
        segment: &'static str,
    },
}

/// Errors from a protocol's request handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// The request payload could not be decoded by the protocol.
    #[error("invalid request payload: {0}")]
    InvalidPayload(String),

    /// The handler declined to answer.
    #[error("request rejected: {0}")]
    Rejected(String),
}

/// Errors surfaced by the client facade.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The transport refused the message. Carries the transport's error verbatim.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Signing the outbound envelope failed.
    #[error("signing error: {0}")]
    Signing(#[from] SignerError),

    /// Encoding the outbound envelope failed.
    #[error("envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    /// The engine has stopped and accepts no further commands.
    #[error("protocol engine for {0} has stopped")]
    EngineStopped(RoutingKey),
}

/// Errors from loading an engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration document could not be parsed.
    #[error("invalid engine config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A field has an unusable value.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// Field name.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Result type for facade operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
