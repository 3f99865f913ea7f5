//! Response fan-out to registered subscribers.
//!
//! Each delivery is a non-blocking `try_send` into the subscriber's bounded
//! queue. A full or closed queue loses that one delivery; the loss is
//! counted and never retried. A stalled subscriber therefore costs at most
//! its own queue capacity and never delays the engine or other subscribers.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::envelope::ResponseEnvelope;

/// Sink a subscriber registers to receive responses.
pub type ResponseSink = mpsc::Sender<ResponseEnvelope>;

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct FanoutReport {
    pub delivered: u64,
    pub dropped: u64,
}

/// Append-only, ordered subscriber collection.
#[derive(Default)]
pub(crate) struct Subscribers {
    sinks: Vec<ResponseSink>,
}

impl Subscribers {
    pub(crate) fn push(&mut self, sink: ResponseSink) {
        self.sinks.push(sink);
    }

    pub(crate) fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Offer `response` to every subscriber once.
    pub(crate) fn broadcast(&self, response: &ResponseEnvelope) -> FanoutReport {
        let mut report = FanoutReport::default();
        for (index, sink) in self.sinks.iter().enumerate() {
            match sink.try_send(response.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::debug!(
                        subscriber = index,
                        correlation_id = %response.correlation_id(),
                        "subscriber queue full, delivery dropped"
                    );
                    report.dropped += 1;
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::trace!(
                        subscriber = index,
                        correlation_id = %response.correlation_id(),
                        "subscriber closed, delivery dropped"
                    );
                    report.dropped += 1;
                }
            }
        }
        report
    }
}
