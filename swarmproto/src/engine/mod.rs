//! The protocol engine: single owner of protocol state.
//!
//! One tokio task per protocol instance merges three event sources with
//! `tokio::select!`:
//!
//! ```text
//!   transport ──▶ request queue  ──┐
//!   transport ──▶ response queue ──┼──▶ engine loop ──▶ transport (responses)
//!   facade    ──▶ command queue  ──┘         │
//!                                            └──▶ subscribers (fan-out)
//! ```
//!
//! There is no priority across sources; each source is FIFO. The subscriber
//! collection lives inside the loop and is never shared, so no lock guards it.
//!
//! # Lifecycle
//!
//! The engine is `Running` from [`ProtocolEngine::start`] until a `Stop`
//! command arrives (via [`EngineHandle::stop`]) or every command sender is
//! dropped. On stop the engine closes all three queues, drains the events
//! already queued, and exits. Fan-out never awaits, so nothing is in flight
//! when the task returns.

mod config;
mod fanout;
mod handler;
mod stats;

pub use config::EngineConfig;
pub use fanout::ResponseSink;
pub use handler::{EchoHandler, RequestHandler};
pub use stats::{EngineStats, StatsSnapshot};

use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::envelope::{decode, sign_envelope, verify_envelope, Envelope};
use crate::error::ConfigError;
use crate::protocol::ProtocolClient;
use crate::routing::ProtocolRoutes;
use crate::signer::Signer;
use crate::transport::{InboundMessage, Transport};

use fanout::Subscribers;

/// Commands sent by facades to the engine loop.
pub(crate) enum Command {
    /// Append a subscriber.
    Subscribe(ResponseSink),
    /// Acknowledge once every earlier command has been applied.
    Flush(oneshot::Sender<()>),
    /// Stop accepting events, drain, and exit.
    Stop,
}

/// One unit of work for the engine loop.
pub(crate) enum EngineEvent {
    InboundRequest(InboundMessage),
    InboundResponse(InboundMessage),
    Command(Command),
}

/// Which inbound path a message arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Request,
    Response,
}

/// State owned by the engine task.
pub struct ProtocolEngine {
    routes: ProtocolRoutes,
    request_protocol: String,
    response_protocol: String,
    transport: Arc<dyn Transport>,
    signer: Arc<dyn Signer>,
    handler: Arc<dyn RequestHandler>,
    config: EngineConfig,
    subscribers: Subscribers,
    stats: Arc<EngineStats>,
}

/// Owner handle for a running engine task.
pub struct EngineHandle {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
    stats: Arc<EngineStats>,
}

impl EngineHandle {
    /// Stop the engine, wait for it to drain, and return its final counters.
    ///
    /// Safe to call after the engine already stopped on its own.
    pub async fn stop(self) -> StatsSnapshot {
        // Err means the loop already exited.
        let _ = self.commands.send(Command::Stop);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "protocol engine task failed");
        }
        self.stats.snapshot()
    }

    /// Whether the engine task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Current counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

impl ProtocolEngine {
    /// Register the protocol's routing keys with `transport` and spawn its engine.
    ///
    /// Returns the facade for application code and the owner handle used to
    /// stop the engine.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` fails validation.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start(
        routes: ProtocolRoutes,
        transport: Arc<dyn Transport>,
        signer: Arc<dyn Signer>,
        handler: Arc<dyn RequestHandler>,
        config: EngineConfig,
    ) -> Result<(ProtocolClient, EngineHandle), ConfigError> {
        config.validate()?;

        let (request_tx, request_rx) = mpsc::channel(config.inbound_queue_capacity);
        let (response_tx, response_rx) = mpsc::channel(config.inbound_queue_capacity);
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        transport.register_handler(routes.request.clone(), request_tx);
        transport.register_handler(routes.response.clone(), response_tx);

        let stats = Arc::new(EngineStats::default());
        let client = ProtocolClient::new(
            routes.clone(),
            Arc::clone(&transport),
            Arc::clone(&signer),
            command_tx.clone(),
            Arc::clone(&stats),
            config.subscriber_queue_capacity,
        );

        let engine = Self::new(routes, transport, signer, handler, config, Arc::clone(&stats));
        let task = tokio::spawn(engine.run(request_rx, response_rx, command_rx));

        Ok((
            client,
            EngineHandle {
                commands: command_tx,
                task,
                stats,
            },
        ))
    }

    fn new(
        routes: ProtocolRoutes,
        transport: Arc<dyn Transport>,
        signer: Arc<dyn Signer>,
        handler: Arc<dyn RequestHandler>,
        config: EngineConfig,
        stats: Arc<EngineStats>,
    ) -> Self {
        Self {
            request_protocol: routes.request.to_string(),
            response_protocol: routes.response.to_string(),
            routes,
            transport,
            signer,
            handler,
            config,
            subscribers: Subscribers::default(),
            stats,
        }
    }

    /// The serialized event loop.
    async fn run(
        mut self,
        mut requests: mpsc::Receiver<InboundMessage>,
        mut responses: mpsc::Receiver<InboundMessage>,
        mut commands: mpsc::UnboundedReceiver<Command>,
    ) {
        tracing::info!(
            request = %self.routes.request,
            response = %self.routes.response,
            "protocol engine started"
        );

        loop {
            let event = tokio::select! {
                Some(message) = requests.recv() => EngineEvent::InboundRequest(message),
                Some(message) = responses.recv() => EngineEvent::InboundResponse(message),
                command = commands.recv() => match command {
                    Some(command) => EngineEvent::Command(command),
                    // Every facade and the handle are gone.
                    None => EngineEvent::Command(Command::Stop),
                },
            };

            if self.handle_event(event).is_break() {
                break;
            }
        }

        requests.close();
        responses.close();
        commands.close();

        while let Some(command) = commands.recv().await {
            // A second Stop while draining changes nothing.
            let _ = self.handle_event(EngineEvent::Command(command));
        }
        while let Some(message) = requests.recv().await {
            self.handle_request(message);
        }
        while let Some(message) = responses.recv().await {
            self.handle_response(message);
        }

        tracing::info!(request = %self.routes.request, "protocol engine stopped");
    }

    /// Process one event. Breaks on `Stop`.
    pub(crate) fn handle_event(&mut self, event: EngineEvent) -> ControlFlow<()> {
        match event {
            EngineEvent::InboundRequest(message) => self.handle_request(message),
            EngineEvent::InboundResponse(message) => self.handle_response(message),
            EngineEvent::Command(Command::Subscribe(sink)) => {
                self.subscribers.push(sink);
                self.stats.set_subscribers(self.subscribers.len());
                tracing::debug!(
                    protocol = %self.routes.response,
                    subscribers = self.subscribers.len(),
                    "subscriber registered"
                );
            }
            EngineEvent::Command(Command::Flush(ack)) => {
                // The waiter may have given up.
                let _ = ack.send(());
            }
            EngineEvent::Command(Command::Stop) => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    /// Decode, check and verify an inbound envelope.
    ///
    /// Failures are logged; `None` means drop.
    fn accept(&self, message: &InboundMessage, direction: Direction) -> Option<Envelope> {
        let expected = match direction {
            Direction::Request => &self.request_protocol,
            Direction::Response => &self.response_protocol,
        };

        let envelope = match decode(&message.bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(
                    peer = %message.sender,
                    protocol = %expected,
                    error = %e,
                    "invalid envelope"
                );
                return None;
            }
        };

        if envelope.is_response() != (direction == Direction::Response)
            || envelope.protocol_id() != expected
        {
            tracing::warn!(
                peer = %message.sender,
                protocol = %expected,
                got_protocol = %envelope.protocol_id(),
                is_response = envelope.is_response(),
                "envelope does not match its routing key"
            );
            return None;
        }

        if self.config.verify_inbound {
            match verify_envelope(self.signer.as_ref(), &envelope, &message.sender_key) {
                Ok(true) => {}
                Ok(false) => {
                    tracing::warn!(
                        peer = %message.sender,
                        protocol = %expected,
                        correlation_id = %envelope.correlation_id(),
                        "signature verification failed"
                    );
                    return None;
                }
                Err(e) => {
                    tracing::warn!(
                        peer = %message.sender,
                        protocol = %expected,
                        error = %e,
                        "unverifiable envelope"
                    );
                    return None;
                }
            }
        }

        Some(envelope)
    }

    /// Answer an inbound request with a signed response.
    fn handle_request(&self, message: InboundMessage) {
        self.stats.record_request();

        let Some(request) = self.accept(&message, Direction::Request) else {
            self.stats.record_request_dropped();
            return;
        };

        tracing::debug!(
            peer = %message.sender,
            correlation_id = %request.correlation_id(),
            payload_len = request.payload.len(),
            "incoming request"
        );

        let payload = match self.handler.handle(&message.sender, &request) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(
                    peer = %message.sender,
                    correlation_id = %request.correlation_id(),
                    error = %e,
                    "request handler failed"
                );
                self.stats.record_request_dropped();
                return;
            }
        };

        let mut response = Envelope::response_to(&request, self.response_protocol.clone(), payload);
        let wire = match sign_envelope(self.signer.as_ref(), &mut response) {
            Ok(wire) => wire,
            Err(e) => {
                tracing::warn!(
                    peer = %message.sender,
                    correlation_id = %request.correlation_id(),
                    error = %e,
                    "failed to sign response"
                );
                self.stats.record_request_dropped();
                return;
            }
        };

        match self
            .transport
            .send(&message.sender, response.correlation_id(), wire)
        {
            Ok(()) => self.stats.record_answered(),
            Err(e) => {
                tracing::warn!(
                    peer = %message.sender,
                    correlation_id = %request.correlation_id(),
                    error = %e,
                    "failed to send response"
                );
                self.stats.record_request_dropped();
            }
        }
    }

    /// Broadcast an inbound response to every subscriber.
    fn handle_response(&self, message: InboundMessage) {
        self.stats.record_response();

        let Some(response) = self.accept(&message, Direction::Response) else {
            self.stats.record_response_dropped();
            return;
        };

        let report = self.subscribers.broadcast(&response);
        self.stats.record_fanout(report.delivered, report.dropped);

        tracing::debug!(
            peer = %message.sender,
            correlation_id = %response.correlation_id(),
            delivered = report.delivered,
            dropped = report.dropped,
            "response fanned out"
        );
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::envelope::{encode_signed, RequestEnvelope};
    use crate::error::{HandlerError, TransportError};
    use crate::routing::RoutingKey;
    use crate::signer::Ed25519Signer;
    use crate::types::{CorrelationId, PeerId};

    /// Records every send; optionally fails them.
    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(PeerId, CorrelationId, Vec<u8>)>>,
        fail: bool,
    }

    impl Transport for RecordingTransport {
        fn send(
            &self,
            target: &PeerId,
            correlation_id: &CorrelationId,
            payload: Vec<u8>,
        ) -> Result<(), TransportError> {
            if self.fail {
                return Err(TransportError::UnknownPeer(target.clone()));
            }
            self.sent
                .lock()
                .push((target.clone(), correlation_id.clone(), payload));
            Ok(())
        }

        fn register_handler(&self, _key: RoutingKey, _inbound: mpsc::Sender<InboundMessage>) {}
    }

    fn routes() -> ProtocolRoutes {
        ProtocolRoutes::for_method("echo", "1.0", "echo").expect("valid routes")
    }

    fn engine_with(
        transport: Arc<RecordingTransport>,
        handler: Arc<dyn RequestHandler>,
        signer: Arc<Ed25519Signer>,
    ) -> ProtocolEngine {
        ProtocolEngine::new(
            routes(),
            transport,
            signer,
            handler,
            EngineConfig::default(),
            Arc::new(EngineStats::default()),
        )
    }

    fn signed(signer: &Ed25519Signer, mut envelope: Envelope) -> Vec<u8> {
        sign_envelope(signer, &mut envelope).expect("sign")
    }

    fn inbound(from: &str, signer: &Ed25519Signer, bytes: Vec<u8>) -> InboundMessage {
        InboundMessage {
            sender: PeerId::from(from),
            sender_key: signer.public_key(),
            bytes,
        }
    }

    fn request_bytes(signer: &Ed25519Signer, id: &[u8], payload: &[u8]) -> Vec<u8> {
        signed(
            signer,
            Envelope::request("/echo/1.0/echo-req/", CorrelationId::from(id), payload.to_vec()),
        )
    }

    fn response_bytes(signer: &Ed25519Signer, id: &[u8], payload: &[u8]) -> Vec<u8> {
        let request = Envelope::request("/echo/1.0/echo-req/", CorrelationId::from(id), Vec::new());
        signed(
            signer,
            Envelope::response_to(&request, "/echo/1.0/echo-resp/", payload.to_vec()),
        )
    }

    #[test]
    fn test_request_is_answered_with_same_correlation_id() {
        let local = Arc::new(Ed25519Signer::generate());
        let remote = Ed25519Signer::generate();
        let transport = Arc::new(RecordingTransport::default());
        let mut engine = engine_with(
            Arc::clone(&transport),
            Arc::new(EchoHandler),
            Arc::clone(&local),
        );

        let flow = engine.handle_event(EngineEvent::InboundRequest(inbound(
            "NodeA",
            &remote,
            request_bytes(&remote, &[0x01, 0x02], b"hello"),
        )));
        assert!(flow.is_continue());

        let sent = transport.sent.lock();
        assert_eq!(sent.len(), 1);
        let (target, correlation_id, wire) = &sent[0];
        assert_eq!(target, &PeerId::from("NodeA"));
        assert_eq!(correlation_id.as_bytes(), &[0x01, 0x02]);

        let response = decode(wire).expect("decodable response");
        assert!(response.is_response());
        assert_eq!(response.protocol_id(), "/echo/1.0/echo-resp/");
        assert_eq!(response.correlation_id().as_bytes(), &[0x01, 0x02]);
        assert_eq!(&response.payload[..], b"hello");
        assert!(verify_envelope(local.as_ref(), &response, &local.public_key()).expect("verify"));

        let stats = engine.stats.snapshot();
        assert_eq!(stats.requests_received, 1);
        assert_eq!(stats.requests_answered, 1);
    }

    #[test]
    fn test_malformed_request_produces_no_send() {
        let local = Arc::new(Ed25519Signer::generate());
        let remote = Ed25519Signer::generate();
        let transport = Arc::new(RecordingTransport::default());
        let mut engine = engine_with(Arc::clone(&transport), Arc::new(EchoHandler), local);

        let valid = request_bytes(&remote, &[7], b"payload");
        let mut corrupted = valid.clone();
        let last = corrupted.len() - 1;
        corrupted[last] ^= 0xff;

        for bytes in [Vec::new(), vec![0xff; 3], valid[..valid.len() / 2].to_vec(), corrupted] {
            let flow =
                engine.handle_event(EngineEvent::InboundRequest(inbound("x", &remote, bytes)));
            assert!(flow.is_continue());
        }

        assert!(transport.sent.lock().is_empty());
        let stats = engine.stats.snapshot();
        assert_eq!(stats.requests_received, 4);
        assert_eq!(stats.requests_dropped, 4);
    }

    #[test]
    fn test_wrong_key_or_wrong_route_is_dropped() {
        let local = Arc::new(Ed25519Signer::generate());
        let remote = Ed25519Signer::generate();
        let impostor = Ed25519Signer::generate();
        let transport = Arc::new(RecordingTransport::default());
        let mut engine = engine_with(Arc::clone(&transport), Arc::new(EchoHandler), local);

        // Signed by someone other than the claimed sender.
        let _ = engine.handle_event(EngineEvent::InboundRequest(inbound(
            "NodeA",
            &remote,
            request_bytes(&impostor, &[1], b"x"),
        )));
        // A response delivered on the request route.
        let _ = engine.handle_event(EngineEvent::InboundRequest(inbound(
            "NodeA",
            &remote,
            response_bytes(&remote, &[1], b"x"),
        )));
        // Another protocol's request.
        let _ = engine.handle_event(EngineEvent::InboundRequest(inbound(
            "NodeA",
            &remote,
            signed(
                &remote,
                Envelope::request(
                    "/other/1.0/echo-req/",
                    CorrelationId::from(vec![1]),
                    b"x".to_vec(),
                ),
            ),
        )));

        assert!(transport.sent.lock().is_empty());
        assert_eq!(engine.stats.snapshot().requests_dropped, 3);
    }

    #[test]
    fn test_unverified_config_accepts_unsigned_request() {
        let local = Arc::new(Ed25519Signer::generate());
        let transport = Arc::new(RecordingTransport::default());
        let mut engine = ProtocolEngine::new(
            routes(),
            Arc::clone(&transport) as Arc<dyn Transport>,
            local.clone(),
            Arc::new(EchoHandler),
            EngineConfig::unverified(),
            Arc::new(EngineStats::default()),
        );

        let unsigned = encode_signed(&Envelope::request(
            "/echo/1.0/echo-req/",
            CorrelationId::from(vec![3]),
            b"x".to_vec(),
        ))
        .expect("encode");
        let _ = engine.handle_event(EngineEvent::InboundRequest(inbound(
            "NodeA", &local, unsigned,
        )));

        assert_eq!(transport.sent.lock().len(), 1);
    }

    #[test]
    fn test_handler_and_transport_failures_drop_silently() {
        let local = Arc::new(Ed25519Signer::generate());
        let remote = Ed25519Signer::generate();

        let transport = Arc::new(RecordingTransport::default());
        let refusing = |_: &PeerId, _: &RequestEnvelope| -> Result<bytes::Bytes, HandlerError> {
            Err(HandlerError::Rejected("no".to_string()))
        };
        let mut engine = engine_with(
            Arc::clone(&transport),
            Arc::new(refusing),
            Arc::clone(&local),
        );
        let _ = engine.handle_event(EngineEvent::InboundRequest(inbound(
            "NodeA",
            &remote,
            request_bytes(&remote, &[1], b"x"),
        )));
        assert!(transport.sent.lock().is_empty());
        assert_eq!(engine.stats.snapshot().requests_dropped, 1);

        let failing = Arc::new(RecordingTransport {
            fail: true,
            ..Default::default()
        });
        let mut engine = engine_with(failing, Arc::new(EchoHandler), local);
        let _ = engine.handle_event(EngineEvent::InboundRequest(inbound(
            "NodeA",
            &remote,
            request_bytes(&remote, &[1], b"x"),
        )));
        let stats = engine.stats.snapshot();
        assert_eq!(stats.requests_dropped, 1);
        assert_eq!(stats.requests_answered, 0);
    }

    #[test]
    fn test_response_fans_out_only_to_prior_subscribers() {
        let local = Arc::new(Ed25519Signer::generate());
        let remote = Ed25519Signer::generate();
        let transport = Arc::new(RecordingTransport::default());
        let mut engine = engine_with(Arc::clone(&transport), Arc::new(EchoHandler), local);

        let (early_tx, mut early_rx) = mpsc::channel(4);
        let (late_tx, mut late_rx) = mpsc::channel(4);

        let _ = engine.handle_event(EngineEvent::Command(Command::Subscribe(early_tx)));
        let _ = engine.handle_event(EngineEvent::InboundResponse(inbound(
            "NodeB",
            &remote,
            response_bytes(&remote, &[0x01], b"hello"),
        )));
        let _ = engine.handle_event(EngineEvent::Command(Command::Subscribe(late_tx)));

        let delivered = early_rx.try_recv().expect("early subscriber delivery");
        assert_eq!(delivered.correlation_id().as_bytes(), &[0x01]);
        assert_eq!(&delivered.payload[..], b"hello");
        assert!(early_rx.try_recv().is_err());
        assert!(late_rx.try_recv().is_err());

        // Responses never trigger outbound sends.
        assert!(transport.sent.lock().is_empty());

        let stats = engine.stats.snapshot();
        assert_eq!(stats.subscribers, 2);
        assert_eq!(stats.deliveries, 1);
    }

    #[test]
    fn test_malformed_response_is_not_delivered() {
        let local = Arc::new(Ed25519Signer::generate());
        let remote = Ed25519Signer::generate();
        let mut engine = engine_with(
            Arc::new(RecordingTransport::default()),
            Arc::new(EchoHandler),
            local,
        );
        let (tx, mut rx) = mpsc::channel(4);
        let _ = engine.handle_event(EngineEvent::Command(Command::Subscribe(tx)));

        let mut tampered = response_bytes(&remote, &[9], b"pong");
        let last = tampered.len() - 1;
        tampered[last] = b'P';
        for bytes in [vec![1u8], tampered, request_bytes(&remote, &[9], b"ping")] {
            let _ = engine.handle_event(EngineEvent::InboundResponse(inbound(
                "NodeB", &remote, bytes,
            )));
        }

        assert!(rx.try_recv().is_err());
        assert_eq!(engine.stats.snapshot().responses_dropped, 3);
    }

    #[test]
    fn test_flush_and_stop_commands() {
        let local = Arc::new(Ed25519Signer::generate());
        let mut engine = engine_with(
            Arc::new(RecordingTransport::default()),
            Arc::new(EchoHandler),
            local,
        );

        let (ack_tx, mut ack_rx) = oneshot::channel();
        assert!(engine
            .handle_event(EngineEvent::Command(Command::Flush(ack_tx)))
            .is_continue());
        assert!(ack_rx.try_recv().is_ok());

        assert!(engine.handle_event(EngineEvent::Command(Command::Stop)).is_break());
    }
}
