//! Configuration structures for protocol engine behavior.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Configuration for a protocol engine instance.
///
/// Deserializes from JSON with every field optional:
///
/// ```rust
/// use swarmproto::EngineConfig;
///
/// let config = EngineConfig::from_json(r#"{ "verify_inbound": false }"#).unwrap();
/// assert!(!config.verify_inbound);
/// assert_eq!(config.inbound_queue_capacity, 10);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Capacity of each inbound queue registered with the transport.
    ///
    /// When full, the transport refuses further messages for that routing key.
    pub inbound_queue_capacity: usize,

    /// Queue capacity used by [`subscribe`](crate::ProtocolClient::subscribe).
    ///
    /// A subscriber whose queue is full misses deliveries until it drains.
    pub subscriber_queue_capacity: usize,

    /// Verify author signatures of inbound envelopes against the sender's key.
    pub verify_inbound: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            inbound_queue_capacity: 10,
            subscriber_queue_capacity: 64,
            verify_inbound: true,
        }
    }
}

impl EngineConfig {
    /// Create a configuration with the given queue capacities.
    pub fn new(inbound_queue_capacity: usize, subscriber_queue_capacity: usize) -> Self {
        Self {
            inbound_queue_capacity,
            subscriber_queue_capacity,
            verify_inbound: true,
        }
    }

    /// Enable or disable inbound signature verification.
    pub fn with_verification(mut self, verify_inbound: bool) -> Self {
        self.verify_inbound = verify_inbound;
        self
    }

    /// Set the subscriber queue capacity.
    pub fn with_subscriber_capacity(mut self, capacity: usize) -> Self {
        self.subscriber_queue_capacity = capacity;
        self
    }

    /// Deep queues for nodes handling bursts of traffic.
    pub fn high_throughput() -> Self {
        Self {
            inbound_queue_capacity: 1024,
            subscriber_queue_capacity: 4096,
            verify_inbound: true,
        }
    }

    /// Skip signature verification (trusted substrates and tests).
    pub fn unverified() -> Self {
        Self::default().with_verification(false)
    }

    /// Parse a JSON configuration document and validate it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the document is malformed or a capacity is zero.
    pub fn from_json(document: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(document)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that capacities are usable by tokio channels.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for a zero capacity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.inbound_queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "inbound_queue_capacity",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.subscriber_queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "subscriber_queue_capacity",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
