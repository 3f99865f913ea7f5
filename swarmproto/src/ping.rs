//! Ping: a minimal application-level request/response protocol.
//!
//! A ping carries a UTF-8 text message; the responder echoes it back
//! unchanged under the same correlation id.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use swarmproto::{
//!     CorrelationId, Ed25519Signer, EngineConfig, MemoryNetwork, PeerId, PingProtocol, Signer,
//! };
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let network = MemoryNetwork::new();
//! let signer = Arc::new(Ed25519Signer::generate());
//! let transport = Arc::new(network.join(PeerId::from("NodeA"), signer.public_key()));
//!
//! let (ping, handle) = PingProtocol::start(transport, signer, EngineConfig::default())?;
//! let mut pongs = ping.subscribe();
//! ping.flush().await?;
//! ping.send_ping("hello", CorrelationId::from(vec![0x01]), &PeerId::from("NodeB"))?;
//! if let Some(pong) = pongs.recv().await {
//!     println!("{:?}", PingProtocol::pong_text(&pong));
//! }
//! handle.stop().await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::engine::{
    EngineConfig, EngineHandle, ProtocolEngine, RequestHandler, ResponseSink, StatsSnapshot,
};
use crate::envelope::{RequestEnvelope, ResponseEnvelope};
use crate::error::{ConfigError, HandlerError, ProtocolResult};
use crate::protocol::{Protocol, ProtocolClient};
use crate::routing::{ProtocolRoutes, RoutingKey};
use crate::signer::Signer;
use crate::transport::Transport;
use crate::types::{CorrelationId, PeerId};

/// Routing key of ping requests.
pub const PING_REQUEST: &str = "/ping/1.0/ping-req/";

/// Routing key of ping responses.
pub const PING_RESPONSE: &str = "/ping/1.0/ping-resp/";

/// Echoes the text of a ping request.
#[derive(Debug, Clone, Copy, Default)]
pub struct PingHandler;

impl RequestHandler for PingHandler {
    fn handle(&self, sender: &PeerId, request: &RequestEnvelope) -> Result<Bytes, HandlerError> {
        let text = std::str::from_utf8(&request.payload)
            .map_err(|e| HandlerError::InvalidPayload(e.to_string()))?;
        tracing::info!(
            peer = %sender,
            correlation_id = %request.correlation_id(),
            message = text,
            "incoming ping"
        );
        Ok(request.payload.clone())
    }
}

/// Ping protocol instance bound to one node.
#[derive(Debug, Clone)]
pub struct PingProtocol {
    client: ProtocolClient,
}

impl PingProtocol {
    /// Routing keys of the ping protocol.
    pub fn routes() -> ProtocolRoutes {
        ProtocolRoutes {
            request: RoutingKey::from_static("ping", "1.0", "ping-req"),
            response: RoutingKey::from_static("ping", "1.0", "ping-resp"),
        }
    }

    /// Register the ping routes with `transport` and start the engine.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` is invalid.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start(
        transport: Arc<dyn Transport>,
        signer: Arc<dyn Signer>,
        config: EngineConfig,
    ) -> Result<(Self, EngineHandle), ConfigError> {
        let (client, handle) = ProtocolEngine::start(
            Self::routes(),
            transport,
            signer,
            Arc::new(PingHandler),
            config,
        )?;
        Ok((Self { client }, handle))
    }

    /// Send `msg` to `peer`. The pong arrives on registered sinks with `req_id`.
    ///
    /// # Errors
    ///
    /// See [`Protocol::send_request`].
    pub fn send_ping(&self, msg: &str, req_id: CorrelationId, peer: &PeerId) -> ProtocolResult<()> {
        self.client
            .send_request(Bytes::copy_from_slice(msg.as_bytes()), req_id, peer)
    }

    /// Text carried by a pong.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::InvalidPayload`] if the payload is not UTF-8.
    pub fn pong_text(response: &ResponseEnvelope) -> Result<&str, HandlerError> {
        std::str::from_utf8(&response.payload)
            .map_err(|e| HandlerError::InvalidPayload(e.to_string()))
    }

    /// See [`ProtocolClient::subscribe`].
    pub fn subscribe(&self) -> mpsc::Receiver<ResponseEnvelope> {
        self.client.subscribe()
    }

    /// See [`ProtocolClient::flush`].
    ///
    /// # Errors
    ///
    /// Returns an error if the engine has stopped.
    pub async fn flush(&self) -> ProtocolResult<()> {
        self.client.flush().await
    }

    /// Current engine counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.client.stats()
    }
}

impl Protocol for PingProtocol {
    fn send_request(
        &self,
        payload: Bytes,
        correlation_id: CorrelationId,
        target: &PeerId,
    ) -> ProtocolResult<()> {
        self.client.send_request(payload, correlation_id, target)
    }

    fn register_callback(&self, sink: ResponseSink) {
        self.client.register_callback(sink);
    }
}
