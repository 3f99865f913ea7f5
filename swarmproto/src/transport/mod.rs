//! Transport seam: delivers raw bytes to and from remote peers.
//!
//! The engine registers one inbound queue per routing key at startup and
//! hands signed envelopes to [`Transport::send`]. Connection management,
//! discovery and retries all live behind this trait.

mod memory;

pub use memory::{MemoryNetwork, MemoryTransport};

use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::routing::RoutingKey;
use crate::types::{CorrelationId, PeerId, PublicKey};

/// Raw inbound bytes plus the identity of the peer that sent them.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Peer the bytes came from.
    pub sender: PeerId,
    /// Public key the transport associates with `sender`.
    pub sender_key: PublicKey,
    /// Encoded envelope.
    pub bytes: Vec<u8>,
}

/// Message substrate consumed by the protocol engine.
pub trait Transport: Send + Sync {
    /// Hand `payload` to the substrate for delivery to `target`.
    ///
    /// Returns once the message is handed off; delivery is not confirmed.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the message cannot be handed off.
    fn send(
        &self,
        target: &PeerId,
        correlation_id: &CorrelationId,
        payload: Vec<u8>,
    ) -> Result<(), TransportError>;

    /// Route inbound messages carrying `key` into `inbound`.
    ///
    /// Called once per routing key at startup. A later registration for the
    /// same key replaces the earlier one.
    fn register_handler(&self, key: RoutingKey, inbound: mpsc::Sender<InboundMessage>);
}
