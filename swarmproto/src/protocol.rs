//! Application-facing protocol facade.
//!
//! [`Protocol`] is the capability every request/response protocol offers:
//! send a signed request, and register a sink for responses. Concrete
//! protocols compose a [`ProtocolClient`] rather than extending a base type.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::engine::{Command, EngineStats, ResponseSink, StatsSnapshot};
use crate::envelope::{sign_envelope, Envelope, ResponseEnvelope};
use crate::error::{ProtocolError, ProtocolResult};
use crate::routing::ProtocolRoutes;
use crate::signer::Signer;
use crate::transport::Transport;
use crate::types::{CorrelationId, PeerId};

/// Request/response capability shared by all protocols.
pub trait Protocol: Send + Sync {
    /// Build, sign and hand a request to the transport.
    ///
    /// Returns once the transport accepted or refused the bytes; it does not
    /// wait for a response. Responses reach registered sinks.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Transport`] with the transport's error
    /// unchanged, or a signing/encoding error. Nothing is retried.
    fn send_request(
        &self,
        payload: Bytes,
        correlation_id: CorrelationId,
        target: &PeerId,
    ) -> ProtocolResult<()>;

    /// Register a sink that receives every response processed after the
    /// registration is applied.
    ///
    /// Never blocks. Registration is asynchronous: a response arriving
    /// before the engine applies it is not delivered to this sink.
    fn register_callback(&self, sink: ResponseSink);
}

/// Cloneable handle to a running protocol engine.
#[derive(Clone)]
pub struct ProtocolClient {
    routes: ProtocolRoutes,
    request_protocol: String,
    transport: Arc<dyn Transport>,
    signer: Arc<dyn Signer>,
    commands: mpsc::UnboundedSender<Command>,
    stats: Arc<EngineStats>,
    subscriber_capacity: usize,
}

impl std::fmt::Debug for ProtocolClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolClient")
            .field("routes", &self.routes)
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}

impl ProtocolClient {
    pub(crate) fn new(
        routes: ProtocolRoutes,
        transport: Arc<dyn Transport>,
        signer: Arc<dyn Signer>,
        commands: mpsc::UnboundedSender<Command>,
        stats: Arc<EngineStats>,
        subscriber_capacity: usize,
    ) -> Self {
        Self {
            request_protocol: routes.request.to_string(),
            routes,
            transport,
            signer,
            commands,
            stats,
            subscriber_capacity,
        }
    }

    /// Routing keys served by this protocol.
    pub fn routes(&self) -> &ProtocolRoutes {
        &self.routes
    }

    /// Create a bounded response queue, register it, and return its receiver.
    ///
    /// Capacity comes from
    /// [`EngineConfig::subscriber_queue_capacity`](crate::EngineConfig::subscriber_queue_capacity).
    pub fn subscribe(&self) -> mpsc::Receiver<ResponseEnvelope> {
        let (tx, rx) = mpsc::channel(self.subscriber_capacity);
        self.register_callback(tx);
        rx
    }

    /// Wait until every registration issued before this call is applied.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::EngineStopped`] if the engine stopped first.
    pub async fn flush(&self) -> ProtocolResult<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.commands
            .send(Command::Flush(ack_tx))
            .map_err(|_| self.stopped())?;
        ack_rx.await.map_err(|_| self.stopped())
    }

    /// Whether the engine has stopped.
    pub fn is_stopped(&self) -> bool {
        self.commands.is_closed()
    }

    /// Current engine counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    fn stopped(&self) -> ProtocolError {
        ProtocolError::EngineStopped(self.routes.request.clone())
    }
}

impl Protocol for ProtocolClient {
    fn send_request(
        &self,
        payload: Bytes,
        correlation_id: CorrelationId,
        target: &PeerId,
    ) -> ProtocolResult<()> {
        if self.is_stopped() {
            return Err(self.stopped());
        }

        let mut request = Envelope::request(self.request_protocol.clone(), correlation_id, payload);
        let wire = sign_envelope(self.signer.as_ref(), &mut request)?;

        tracing::debug!(
            peer = %target,
            protocol = %self.routes.request,
            correlation_id = %request.correlation_id(),
            "sending request"
        );

        self.transport
            .send(target, request.correlation_id(), wire)
            .map_err(ProtocolError::from)
    }

    fn register_callback(&self, sink: ResponseSink) {
        if self.commands.send(Command::Subscribe(sink)).is_err() {
            tracing::warn!(
                protocol = %self.routes.response,
                "engine stopped, subscriber not registered"
            );
        }
    }
}
