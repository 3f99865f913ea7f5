//! Request handlers: turn an inbound request into a response payload.

use bytes::Bytes;

use crate::envelope::RequestEnvelope;
use crate::error::HandlerError;
use crate::types::PeerId;

/// Protocol-specific request logic.
///
/// Runs inside the engine loop, so it must not block. The engine wraps the
/// returned payload in a signed response envelope addressed to `sender`.
/// An error drops the request; the requester sees no response.
pub trait RequestHandler: Send + Sync {
    /// Produce the response payload for `request`.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] if the request should go unanswered.
    fn handle(&self, sender: &PeerId, request: &RequestEnvelope) -> Result<Bytes, HandlerError>;
}

impl<F> RequestHandler for F
where
    F: Fn(&PeerId, &RequestEnvelope) -> Result<Bytes, HandlerError> + Send + Sync,
{
    fn handle(&self, sender: &PeerId, request: &RequestEnvelope) -> Result<Bytes, HandlerError> {
        self(sender, request)
    }
}

/// Answers every request with its own payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoHandler;

impl RequestHandler for EchoHandler {
    fn handle(&self, _sender: &PeerId, request: &RequestEnvelope) -> Result<Bytes, HandlerError> {
        Ok(request.payload.clone())
    }
}
