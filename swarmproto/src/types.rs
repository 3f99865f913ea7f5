//! Core identity types shared across the crate.
//!
//! - [`PeerId`]: opaque identifier of a remote node on the substrate
//! - [`CorrelationId`]: caller-chosen request identifier, echoed by responders
//! - [`PublicKey`] / [`Signature`]: raw key and signature bytes

use std::fmt;

use bytes::Bytes;

/// Identifier of a peer on the messaging substrate.
///
/// The engine never interprets peer ids; they are handed back to the
/// [`Transport`](crate::Transport) verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(String);

impl PeerId {
    /// Create a peer id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PeerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Opaque correlation id chosen by the requester.
///
/// Must be unique among the sender's concurrently in-flight requests.
/// Responders copy it byte-for-byte into the response envelope.
///
/// # Examples
///
/// ```
/// use swarmproto::CorrelationId;
///
/// let id = CorrelationId::from_static(&[0x01]);
/// assert_eq!(id.to_string(), "01");
/// assert_eq!(id.as_bytes(), &[0x01]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct CorrelationId(Bytes);

impl CorrelationId {
    /// Wrap owned bytes.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Wrap a static byte slice without copying.
    pub const fn from_static(bytes: &'static [u8]) -> Self {
        Self(Bytes::from_static(bytes))
    }

    /// Raw bytes of the id.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length of the id in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the id is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

impl From<Vec<u8>> for CorrelationId {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl From<&[u8]> for CorrelationId {
    fn from(bytes: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(bytes))
    }
}

/// Public key bytes of a signer, in the signer's native encoding.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PublicKey(Vec<u8>);

impl PublicKey {
    /// Wrap raw key bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(&self.0))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0))
    }
}

/// Detached signature bytes.
///
/// On the wire the signature travels hex-encoded inside the envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature(Vec<u8>);

impl Signature {
    /// Wrap raw signature bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Raw signature bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lowercase hex encoding, as carried in the envelope.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Parse a hex-encoded signature.
    ///
    /// # Errors
    ///
    /// Returns the underlying `hex` error for odd-length or non-hex input.
    pub fn from_hex(encoded: &str) -> Result<Self, hex::FromHexError> {
        hex::decode(encoded).map(Self)
    }
}
