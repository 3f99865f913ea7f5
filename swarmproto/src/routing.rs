//! Routing keys: `/{protocol}/{version}/{method}/`.
//!
//! The transport dispatches inbound bytes to local handlers by routing key.
//! Every protocol registers two independent keys at startup, one for its
//! request variant and one for its response variant.

use std::fmt;
use std::str::FromStr;

use crate::error::RoutingKeyError;

/// Key identifying a protocol, version and method.
///
/// # Examples
///
/// ```
/// use swarmproto::RoutingKey;
///
/// let key: RoutingKey = "/ping/1.0/ping-req/".parse().unwrap();
/// assert_eq!(key.protocol(), "ping");
/// assert_eq!(key.version(), "1.0");
/// assert_eq!(key.method(), "ping-req");
/// assert_eq!(key.to_string(), "/ping/1.0/ping-req/");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoutingKey {
    protocol: String,
    version: String,
    method: String,
}

impl RoutingKey {
    /// Build a key from its three segments.
    ///
    /// # Errors
    ///
    /// Returns an error if a segment is empty or contains `/`.
    pub fn new(
        protocol: impl Into<String>,
        version: impl Into<String>,
        method: impl Into<String>,
    ) -> Result<Self, RoutingKeyError> {
        let key = Self {
            protocol: protocol.into(),
            version: version.into(),
            method: method.into(),
        };
        for (segment, value) in [
            ("protocol", &key.protocol),
            ("version", &key.version),
            ("method", &key.method),
        ] {
            if value.is_empty() {
                return Err(RoutingKeyError::EmptySegment { segment });
            }
            if value.contains('/') {
                return Err(RoutingKeyError::Malformed(key.to_string()));
            }
        }
        Ok(key)
    }

    /// Build a key from literal segments known to be well formed.
    pub(crate) fn from_static(
        protocol: &'static str,
        version: &'static str,
        method: &'static str,
    ) -> Self {
        debug_assert!([protocol, version, method]
            .iter()
            .all(|s| !s.is_empty() && !s.contains('/')));
        Self {
            protocol: protocol.to_string(),
            version: version.to_string(),
            method: method.to_string(),
        }
    }

    /// Protocol name segment.
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// Version segment.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Method name segment.
    pub fn method(&self) -> &str {
        &self.method
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}/{}/", self.protocol, self.version, self.method)
    }
}

impl FromStr for RoutingKey {
    type Err = RoutingKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let inner = s
            .strip_prefix('/')
            .and_then(|rest| rest.strip_suffix('/'))
            .ok_or_else(|| RoutingKeyError::Malformed(s.to_string()))?;

        let mut parts = inner.split('/');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(protocol), Some(version), Some(method), None) => {
                Self::new(protocol, version, method)
            }
            _ => Err(RoutingKeyError::Malformed(s.to_string())),
        }
    }
}

/// The request/response routing key pair of one protocol method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolRoutes {
    /// Key inbound requests arrive on.
    pub request: RoutingKey,
    /// Key responses are addressed with.
    pub response: RoutingKey,
}

impl ProtocolRoutes {
    /// Derive `{method}-req` and `{method}-resp` keys for a method.
    ///
    /// # Errors
    ///
    /// Returns an error if any segment is malformed.
    pub fn for_method(
        protocol: &str,
        version: &str,
        method: &str,
    ) -> Result<Self, RoutingKeyError> {
        Ok(Self {
            request: RoutingKey::new(protocol, version, format!("{method}-req"))?,
            response: RoutingKey::new(protocol, version, format!("{method}-resp"))?,
        })
    }

    /// Use an explicit key pair.
    pub fn new(request: RoutingKey, response: RoutingKey) -> Self {
        Self { request, response }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let key: RoutingKey = "/ping/1.0/ping-resp/".parse().expect("valid key");
        assert_eq!(key, RoutingKey::new("ping", "1.0", "ping-resp").expect("valid"));
        assert_eq!(key.to_string(), "/ping/1.0/ping-resp/");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in [
            "ping/1.0/ping-req/",
            "/ping/1.0/ping-req",
            "/ping/1.0/",
            "/ping/1.0/a/b/",
            "",
            "/",
        ] {
            assert!(bad.parse::<RoutingKey>().is_err(), "{bad:?} should not parse");
        }
    }

    #[test]
    fn test_empty_segment() {
        let err = "/ping//ping-req/".parse::<RoutingKey>().expect_err("empty version");
        assert_eq!(err, RoutingKeyError::EmptySegment { segment: "version" });
    }

    #[test]
    fn test_new_rejects_slash() {
        assert!(RoutingKey::new("ping", "1/0", "x").is_err());
    }

    #[test]
    fn test_routes_for_method() {
        let routes = ProtocolRoutes::for_method("ping", "1.0", "ping").expect("valid");
        assert_eq!(routes.request.to_string(), "/ping/1.0/ping-req/");
        assert_eq!(routes.response.to_string(), "/ping/1.0/ping-resp/");
        assert_ne!(routes.request, routes.response);
    }
}
