//! Protocol message envelope and its canonical wire encoding.
//!
//! Every protocol message is an [`Envelope`]: a [`Metadata`] header wrapping
//! an opaque payload. The encoding is the exact byte sequence signatures are
//! computed over, so it must be deterministic.
//!
//! # Binary Format
//!
//! ```text
//! [version: 1 byte]                    // ENVELOPE_VERSION
//! [protocol_id_len: 4 bytes (u32)]
//! [protocol_id: N bytes (UTF-8)]       // routing key, e.g. /ping/1.0/ping-req/
//! [correlation_id_len: 4 bytes (u32)]
//! [correlation_id: M bytes]
//! [is_response: 1 byte]                // 0 or 1
//! [signature_len: 4 bytes (u32)]
//! [signature: S bytes (hex ASCII)]     // empty in the unsigned form
//! [payload_len: 4 bytes (u32)]
//! [payload: P bytes]
//! ```
//!
//! All integers are little-endian. Decoding is strict: there is exactly one
//! accepted encoding per logical envelope, so a decoded envelope re-encodes
//! to the same bytes.

mod signing;

pub use signing::{sign_envelope, verify_envelope};

use bytes::Bytes;

use crate::error::EnvelopeError;
use crate::types::CorrelationId;

/// Current envelope format version.
pub const ENVELOPE_VERSION: u8 = 1;

/// Maximum encoded envelope size: 1MB.
pub const MAX_ENVELOPE_SIZE: usize = 1024 * 1024;

/// Envelope header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    /// Routing key of the message, e.g. `/ping/1.0/ping-req/`.
    pub protocol_id: String,
    /// Caller-assigned request id, echoed in responses.
    pub correlation_id: CorrelationId,
    /// Whether this envelope answers a request.
    pub is_response: bool,
    /// Hex-encoded author signature. Empty until signed.
    pub author_signature: String,
}

/// Build an unsigned header. Pure, no I/O.
pub fn build_metadata(
    protocol_id: impl Into<String>,
    correlation_id: CorrelationId,
    is_response: bool,
) -> Metadata {
    Metadata {
        protocol_id: protocol_id.into(),
        correlation_id,
        is_response,
        author_signature: String::new(),
    }
}

/// A protocol message: header plus opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Header fields.
    pub metadata: Metadata,
    /// Protocol-specific content.
    pub payload: Bytes,
}

/// A request envelope (`is_response == false`).
pub type RequestEnvelope = Envelope;

/// A response envelope (`is_response == true`).
pub type ResponseEnvelope = Envelope;

impl Envelope {
    /// Build an unsigned request envelope.
    pub fn request(
        protocol_id: impl Into<String>,
        correlation_id: CorrelationId,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            metadata: build_metadata(protocol_id, correlation_id, false),
            payload: payload.into(),
        }
    }

    /// Build an unsigned response envelope answering `request`.
    ///
    /// The correlation id is copied from the request untouched.
    pub fn response_to(
        request: &Envelope,
        protocol_id: impl Into<String>,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            metadata: build_metadata(protocol_id, request.correlation_id().clone(), true),
            payload: payload.into(),
        }
    }

    /// Routing key carried in the header.
    pub fn protocol_id(&self) -> &str {
        &self.metadata.protocol_id
    }

    /// Correlation id carried in the header.
    pub fn correlation_id(&self) -> &CorrelationId {
        &self.metadata.correlation_id
    }

    /// Whether this is a response.
    pub fn is_response(&self) -> bool {
        self.metadata.is_response
    }

    /// Whether an author signature is attached.
    pub fn is_signed(&self) -> bool {
        !self.metadata.author_signature.is_empty()
    }
}

/// Canonical encoding with the signature field cleared.
///
/// This is the byte sequence signatures are computed and verified over.
///
/// # Errors
///
/// Returns [`EnvelopeError::TooLarge`] if the encoding exceeds
/// [`MAX_ENVELOPE_SIZE`].
pub fn encode_unsigned(envelope: &Envelope) -> Result<Vec<u8>, EnvelopeError> {
    encode_with_signature(envelope, "")
}

/// Final wire form, including the attached signature.
///
/// # Errors
///
/// Returns [`EnvelopeError::TooLarge`] if the encoding exceeds
/// [`MAX_ENVELOPE_SIZE`].
pub fn encode_signed(envelope: &Envelope) -> Result<Vec<u8>, EnvelopeError> {
    encode_with_signature(envelope, &envelope.metadata.author_signature)
}

fn encode_with_signature(envelope: &Envelope, signature: &str) -> Result<Vec<u8>, EnvelopeError> {
    let metadata = &envelope.metadata;
    let size = 1
        + 4
        + metadata.protocol_id.len()
        + 4
        + metadata.correlation_id.len()
        + 1
        + 4
        + signature.len()
        + 4
        + envelope.payload.len();
    if size > MAX_ENVELOPE_SIZE {
        return Err(EnvelopeError::TooLarge {
            size,
            max: MAX_ENVELOPE_SIZE,
        });
    }

    let mut buffer = Vec::with_capacity(size);
    buffer.push(ENVELOPE_VERSION);
    write_field(&mut buffer, "protocol_id", metadata.protocol_id.as_bytes())?;
    write_field(&mut buffer, "correlation_id", metadata.correlation_id.as_bytes())?;
    buffer.push(u8::from(metadata.is_response));
    write_field(&mut buffer, "author_signature", signature.as_bytes())?;
    write_field(&mut buffer, "payload", &envelope.payload)?;
    Ok(buffer)
}

/// Parse the wire form.
///
/// Does not verify the signature; see [`verify_envelope`].
///
/// # Errors
///
/// Returns [`EnvelopeError`] for truncated input, an unknown version, a bad
/// response flag, non-UTF-8 or non-hex string fields, oversize input, or
/// trailing bytes.
pub fn decode(data: &[u8]) -> Result<Envelope, EnvelopeError> {
    if data.len() > MAX_ENVELOPE_SIZE {
        return Err(EnvelopeError::TooLarge {
            size: data.len(),
            max: MAX_ENVELOPE_SIZE,
        });
    }

    let mut reader = Reader::new(data);
    let version = reader.read_u8("version")?;
    if version != ENVELOPE_VERSION {
        return Err(EnvelopeError::UnsupportedVersion(version));
    }

    let protocol_id = reader.read_string("protocol_id")?;
    let correlation_id = CorrelationId::from(reader.read_field("correlation_id")?);
    let is_response = match reader.read_u8("is_response")? {
        0 => false,
        1 => true,
        other => return Err(EnvelopeError::InvalidFlag(other)),
    };
    let author_signature = reader.read_string("author_signature")?;
    if author_signature
        .bytes()
        .any(|b| !(b.is_ascii_digit() || (b'a'..=b'f').contains(&b)))
        || author_signature.len() % 2 != 0
    {
        return Err(EnvelopeError::InvalidSignature(
            "expected lowercase hex".to_string(),
        ));
    }
    let payload = Bytes::copy_from_slice(reader.read_field("payload")?);

    if reader.remaining() > 0 {
        return Err(EnvelopeError::TrailingBytes(reader.remaining()));
    }

    Ok(Envelope {
        metadata: Metadata {
            protocol_id,
            correlation_id,
            is_response,
            author_signature,
        },
        payload,
    })
}

/// Read only the protocol id of an encoded envelope.
///
/// Used by transports to demultiplex without parsing the payload.
///
/// # Errors
///
/// Returns [`EnvelopeError`] if the prefix up to the protocol id is malformed.
pub fn peek_protocol_id(data: &[u8]) -> Result<String, EnvelopeError> {
    let mut reader = Reader::new(data);
    let version = reader.read_u8("version")?;
    if version != ENVELOPE_VERSION {
        return Err(EnvelopeError::UnsupportedVersion(version));
    }
    reader.read_string("protocol_id")
}

/// Write a length-prefixed field.
fn write_field(
    buffer: &mut Vec<u8>,
    field: &'static str,
    bytes: &[u8],
) -> Result<(), EnvelopeError> {
    let len = u32::try_from(bytes.len()).map_err(|_| EnvelopeError::FieldTooLong {
        field,
        len: bytes.len(),
    })?;
    buffer.extend_from_slice(&len.to_le_bytes());
    buffer.extend_from_slice(bytes);
    Ok(())
}

/// Bounds-checked cursor over an encoded envelope.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, field: &'static str, needed: usize) -> Result<&'a [u8], EnvelopeError> {
        if self.remaining() < needed {
            return Err(EnvelopeError::Truncated {
                field,
                needed,
                have: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + needed];
        self.pos += needed;
        Ok(slice)
    }

    fn read_u8(&mut self, field: &'static str) -> Result<u8, EnvelopeError> {
        Ok(self.take(field, 1)?[0])
    }

    fn read_field(&mut self, field: &'static str) -> Result<&'a [u8], EnvelopeError> {
        let len_bytes = self.take(field, 4)?;
        let len = u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]);
        self.take(field, len as usize)
    }

    fn read_string(&mut self, field: &'static str) -> Result<String, EnvelopeError> {
        let bytes = self.read_field(field)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| EnvelopeError::InvalidUtf8 { field })
    }
}
