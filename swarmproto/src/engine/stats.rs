//! Counters maintained by the engine loop.
//!
//! Only the engine task writes these; facades and handles read snapshots.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Live engine counters.
#[derive(Debug, Default)]
pub struct EngineStats {
    requests_received: AtomicU64,
    requests_answered: AtomicU64,
    requests_dropped: AtomicU64,
    responses_received: AtomicU64,
    responses_dropped: AtomicU64,
    deliveries: AtomicU64,
    deliveries_dropped: AtomicU64,
    subscribers: AtomicUsize,
}

/// Point-in-time copy of [`EngineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Inbound request messages taken off the request queue.
    pub requests_received: u64,
    /// Requests for which a signed response was handed to the transport.
    pub requests_answered: u64,
    /// Requests dropped (decode, verification, handler, signing or send failure).
    pub requests_dropped: u64,
    /// Inbound response messages taken off the response queue.
    pub responses_received: u64,
    /// Responses dropped before fan-out (decode or verification failure).
    pub responses_dropped: u64,
    /// Successful deliveries into subscriber queues.
    pub deliveries: u64,
    /// Deliveries dropped because a subscriber queue was full or closed.
    pub deliveries_dropped: u64,
    /// Registered subscribers.
    pub subscribers: usize,
}

impl EngineStats {
    pub(crate) fn record_request(&self) {
        self.requests_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_answered(&self) {
        self.requests_answered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_request_dropped(&self) {
        self.requests_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_response(&self) {
        self.responses_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_response_dropped(&self) {
        self.responses_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fanout(&self, delivered: u64, dropped: u64) {
        self.deliveries.fetch_add(delivered, Ordering::Relaxed);
        self.deliveries_dropped.fetch_add(dropped, Ordering::Relaxed);
    }

    pub(crate) fn set_subscribers(&self, count: usize) {
        self.subscribers.store(count, Ordering::Relaxed);
    }

    /// Copy the current counter values.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests_received: self.requests_received.load(Ordering::Relaxed),
            requests_answered: self.requests_answered.load(Ordering::Relaxed),
            requests_dropped: self.requests_dropped.load(Ordering::Relaxed),
            responses_received: self.responses_received.load(Ordering::Relaxed),
            responses_dropped: self.responses_dropped.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            deliveries_dropped: self.deliveries_dropped.load(Ordering::Relaxed),
            subscribers: self.subscribers.load(Ordering::Relaxed),
        }
    }
}
