//! In-process transport connecting nodes by [`PeerId`].
//!
//! Demultiplexes by the protocol id carried in each envelope, the same way a
//! network substrate routes by routing key. Used by tests and demos.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::envelope::peek_protocol_id;
use crate::error::TransportError;
use crate::routing::RoutingKey;
use crate::types::{CorrelationId, PeerId, PublicKey};

use super::{InboundMessage, Transport};

/// Per-node routing table.
struct NodeEntry {
    public_key: PublicKey,
    handlers: HashMap<String, mpsc::Sender<InboundMessage>>,
}

/// Shared in-process network. Cheap to clone.
///
/// # Example
///
/// ```rust
/// use swarmproto::{Ed25519Signer, MemoryNetwork, PeerId, Signer};
///
/// let network = MemoryNetwork::new();
/// let a = network.join(PeerId::from("NodeA"), Ed25519Signer::generate().public_key());
/// assert_eq!(a.local_peer().as_str(), "NodeA");
/// assert_eq!(network.peer_count(), 1);
/// ```
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    nodes: Arc<RwLock<HashMap<PeerId, NodeEntry>>>,
}

impl MemoryNetwork {
    /// Create an empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a node and return its transport.
    ///
    /// Joining again with the same id replaces the node and drops its
    /// handler registrations.
    pub fn join(&self, peer: PeerId, public_key: PublicKey) -> MemoryTransport {
        self.nodes.write().insert(
            peer.clone(),
            NodeEntry {
                public_key: public_key.clone(),
                handlers: HashMap::new(),
            },
        );
        tracing::debug!(peer = %peer, "node joined memory network");
        MemoryTransport {
            local: peer,
            public_key,
            network: self.clone(),
        }
    }

    /// Detach a node. Later sends to it fail with `UnknownPeer`.
    pub fn leave(&self, peer: &PeerId) {
        if self.nodes.write().remove(peer).is_some() {
            tracing::debug!(peer = %peer, "node left memory network");
        }
    }

    /// Number of attached nodes.
    pub fn peer_count(&self) -> usize {
        self.nodes.read().len()
    }

    /// Public key registered for `peer`.
    pub fn public_key_of(&self, peer: &PeerId) -> Option<PublicKey> {
        self.nodes.read().get(peer).map(|node| node.public_key.clone())
    }
}

/// A node's view of a [`MemoryNetwork`].
#[derive(Clone)]
pub struct MemoryTransport {
    local: PeerId,
    public_key: PublicKey,
    network: MemoryNetwork,
}

impl MemoryTransport {
    /// Id of the local node.
    pub fn local_peer(&self) -> &PeerId {
        &self.local
    }
}

impl Transport for MemoryTransport {
    fn send(
        &self,
        target: &PeerId,
        correlation_id: &CorrelationId,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        let protocol = peek_protocol_id(&payload)?;

        let handler = {
            let nodes = self.network.nodes.read();
            let node = nodes
                .get(target)
                .ok_or_else(|| TransportError::UnknownPeer(target.clone()))?;
            node.handlers
                .get(&protocol)
                .cloned()
                .ok_or_else(|| TransportError::NoHandler {
                    peer: target.clone(),
                    protocol: protocol.clone(),
                })?
        };

        let message = InboundMessage {
            sender: self.local.clone(),
            sender_key: self.public_key.clone(),
            bytes: payload,
        };

        match handler.try_send(message) {
            Ok(()) => {
                tracing::trace!(
                    from = %self.local,
                    to = %target,
                    protocol = %protocol,
                    correlation_id = %correlation_id,
                    "message handed off"
                );
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(TransportError::QueueFull {
                peer: target.clone(),
                protocol,
            }),
            Err(TrySendError::Closed(_)) => Err(TransportError::Closed {
                peer: target.clone(),
                protocol,
            }),
        }
    }

    fn register_handler(&self, key: RoutingKey, inbound: mpsc::Sender<InboundMessage>) {
        let mut nodes = self.network.nodes.write();
        match nodes.get_mut(&self.local) {
            Some(node) => {
                tracing::debug!(peer = %self.local, protocol = %key, "handler registered");
                node.handlers.insert(key.to_string(), inbound);
            }
            None => {
                tracing::warn!(
                    peer = %self.local,
                    protocol = %key,
                    "handler registered for a node that left the network"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{encode_signed, Envelope};

    fn key() -> RoutingKey {
        "/test/1.0/op-req/".parse().expect("valid key")
    }

    fn wire(protocol: &str) -> Vec<u8> {
        encode_signed(&Envelope::request(protocol, CorrelationId::from(vec![1]), b"x".to_vec()))
            .expect("encode")
    }

    #[tokio::test]
    async fn test_send_routes_by_protocol_id() {
        let network = MemoryNetwork::new();
        let a = network.join(PeerId::from("a"), PublicKey::new(vec![0xa]));
        let b = network.join(PeerId::from("b"), PublicKey::new(vec![0xb]));

        let (tx, mut rx) = mpsc::channel(4);
        b.register_handler(key(), tx);

        a.send(&PeerId::from("b"), &CorrelationId::from(vec![1]), wire("/test/1.0/op-req/"))
            .expect("send");

        let message = rx.recv().await.expect("delivered");
        assert_eq!(message.sender, PeerId::from("a"));
        assert_eq!(message.sender_key, PublicKey::new(vec![0xa]));
        assert_eq!(message.bytes, wire("/test/1.0/op-req/"));
    }

    #[test]
    fn test_send_errors() {
        let network = MemoryNetwork::new();
        let a = network.join(PeerId::from("a"), PublicKey::new(Vec::<u8>::new()));
        let b = network.join(PeerId::from("b"), PublicKey::new(Vec::<u8>::new()));
        let id = CorrelationId::default();

        let err = a
            .send(&PeerId::from("nobody"), &id, wire("/test/1.0/op-req/"))
            .expect_err("unknown peer");
        assert_eq!(err, TransportError::UnknownPeer(PeerId::from("nobody")));

        let err = a
            .send(&PeerId::from("b"), &id, wire("/test/1.0/op-req/"))
            .expect_err("no handler");
        assert!(matches!(err, TransportError::NoHandler { .. }));

        let err = a.send(&PeerId::from("b"), &id, vec![0xff]).expect_err("unroutable");
        assert!(matches!(err, TransportError::Unroutable(_)));

        let (tx, rx) = mpsc::channel(1);
        b.register_handler(key(), tx);
        a.send(&PeerId::from("b"), &id, wire("/test/1.0/op-req/")).expect("first fits");
        let err = a
            .send(&PeerId::from("b"), &id, wire("/test/1.0/op-req/"))
            .expect_err("queue full");
        assert!(matches!(err, TransportError::QueueFull { .. }));

        drop(rx);
        let err = a
            .send(&PeerId::from("b"), &id, wire("/test/1.0/op-req/"))
            .expect_err("closed");
        assert!(matches!(err, TransportError::Closed { .. }));
    }

    #[test]
    fn test_leave_and_public_key_lookup() {
        let network = MemoryNetwork::new();
        let _a = network.join(PeerId::from("a"), PublicKey::new(vec![1, 2]));
        assert_eq!(network.public_key_of(&PeerId::from("a")), Some(PublicKey::new(vec![1, 2])));
        network.leave(&PeerId::from("a"));
        assert_eq!(network.peer_count(), 0);
        assert_eq!(network.public_key_of(&PeerId::from("a")), None);
    }
}
