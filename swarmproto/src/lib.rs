//! # swarmproto
//!
//! Signed request/response protocols over a peer-to-peer messaging substrate.
//!
//! This crate provides:
//! - **Envelope codec**: canonical binary envelope and the sign/verify contract
//! - **Protocol engine**: one serialized task per protocol that answers inbound
//!   requests and fans inbound responses out to subscribers
//! - **Client facade**: [`Protocol::send_request`] and
//!   [`Protocol::register_callback`] for application code
//! - **Collaborator seams**: [`Transport`] and [`Signer`] traits, with an
//!   in-process [`MemoryNetwork`] and an [`Ed25519Signer`]
//! - **Ping**: a ready-made echo protocol
//!
//! The library emits `tracing` events and never installs a subscriber.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

// =============================================================================
// Modules
// =============================================================================

/// Error types for every layer.
pub mod error;

/// Peer, correlation and key types.
pub mod types;

/// Routing key parsing and formatting.
pub mod routing;

/// Signing primitive.
pub mod signer;

/// Envelope codec and signing contract.
pub mod envelope;

/// Transport seam and the in-memory network.
pub mod transport;

/// Protocol engine actor.
pub mod engine;

/// Application-facing facade.
pub mod protocol;

/// Ping echo protocol.
pub mod ping;

// =============================================================================
// Public API Re-exports
// =============================================================================

// Error exports
pub use error::{
    ConfigError, EnvelopeError, HandlerError, ProtocolError, ProtocolResult, RoutingKeyError,
    SignerError, TransportError,
};

// Core types
pub use types::{CorrelationId, PeerId, PublicKey, Signature};

// Routing exports
pub use routing::{ProtocolRoutes, RoutingKey};

// Signing exports
pub use signer::{Ed25519Signer, Signer};

// Envelope exports
pub use envelope::{
    ENVELOPE_VERSION, Envelope, MAX_ENVELOPE_SIZE, Metadata, RequestEnvelope, ResponseEnvelope,
    build_metadata, decode, encode_signed, encode_unsigned, peek_protocol_id, sign_envelope,
    verify_envelope,
};

// Transport exports
pub use transport::{InboundMessage, MemoryNetwork, MemoryTransport, Transport};

// Engine exports
pub use engine::{
    EchoHandler, EngineConfig, EngineHandle, EngineStats, ProtocolEngine, RequestHandler,
    ResponseSink, StatsSnapshot,
};

// Facade exports
pub use protocol::{Protocol, ProtocolClient};

// Ping exports
pub use ping::{PING_REQUEST, PING_RESPONSE, PingHandler, PingProtocol};
