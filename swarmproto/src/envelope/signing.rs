//! The sign/verify envelope contract.
//!
//! Outbound: `encode_unsigned → sign → attach hex signature → encode_signed`.
//! Inbound: `decode → encode_unsigned → verify`. Changing any field other
//! than the signature breaks verification.

use crate::error::{EnvelopeError, ProtocolError};
use crate::signer::Signer;
use crate::types::{PublicKey, Signature};

use super::{encode_signed, encode_unsigned, Envelope};

/// Sign `envelope` in place and return its final wire form.
///
/// Any signature already present is replaced.
///
/// # Errors
///
/// Returns [`ProtocolError::Envelope`] if encoding fails and
/// [`ProtocolError::Signing`] if the signer fails.
pub fn sign_envelope(
    signer: &dyn Signer,
    envelope: &mut Envelope,
) -> Result<Vec<u8>, ProtocolError> {
    envelope.metadata.author_signature.clear();
    let unsigned = encode_unsigned(envelope)?;
    let signature = signer.sign(&unsigned)?;
    envelope.metadata.author_signature = signature.to_hex();
    Ok(encode_signed(envelope)?)
}

/// Check the attached signature of a decoded envelope against `public_key`.
///
/// # Errors
///
/// Returns [`EnvelopeError`] if the envelope cannot be re-encoded or its
/// signature is not valid hex. An unsigned envelope or a signature that
/// does not match yields `Ok(false)`.
pub fn verify_envelope(
    signer: &dyn Signer,
    envelope: &Envelope,
    public_key: &PublicKey,
) -> Result<bool, EnvelopeError> {
    if !envelope.is_signed() {
        return Ok(false);
    }
    let signature = Signature::from_hex(&envelope.metadata.author_signature)
        .map_err(|e| EnvelopeError::InvalidSignature(e.to_string()))?;
    let unsigned = encode_unsigned(envelope)?;
    Ok(signer.verify(&unsigned, &signature, public_key))
}
