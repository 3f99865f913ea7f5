//! Signing primitive used by the envelope contract.
//!
//! The engine only depends on the [`Signer`] trait; [`Ed25519Signer`] is the
//! implementation nodes use by default.

use ed25519_dalek::{Signer as _, SigningKey, Verifier as _, VerifyingKey};
use rand::rngs::OsRng;

use crate::error::SignerError;
use crate::types::{PublicKey, Signature};

/// Produces and verifies detached signatures over byte sequences.
///
/// Implementations must be safe to share between the engine task and any
/// number of callers of [`send_request`](crate::Protocol::send_request).
pub trait Signer: Send + Sync {
    /// Sign `message` with the local identity.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError`] if the signature cannot be produced.
    fn sign(&self, message: &[u8]) -> Result<Signature, SignerError>;

    /// Check `signature` over `message` against `public_key`.
    ///
    /// Malformed keys or signatures verify as `false`.
    fn verify(&self, message: &[u8], signature: &Signature, public_key: &PublicKey) -> bool;

    /// Public key of the local identity.
    fn public_key(&self) -> PublicKey;
}

/// Ed25519 identity.
pub struct Ed25519Signer {
    key: SigningKey,
}

impl Ed25519Signer {
    /// Generate a fresh identity from the OS RNG.
    pub fn generate() -> Self {
        Self {
            key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Load an identity from a 32-byte secret key.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::InvalidKey`] if `secret` is not 32 bytes.
    pub fn from_secret_bytes(secret: &[u8]) -> Result<Self, SignerError> {
        let bytes: [u8; 32] = secret.try_into().map_err(|_| {
            SignerError::InvalidKey(format!("expected 32 secret key bytes, got {}", secret.len()))
        })?;
        Ok(Self {
            key: SigningKey::from_bytes(&bytes),
        })
    }
}

impl std::fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519Signer")
            .field("public_key", &self.public_key())
            .finish()
    }
}

impl Signer for Ed25519Signer {
    fn sign(&self, message: &[u8]) -> Result<Signature, SignerError> {
        let signature = self
            .key
            .try_sign(message)
            .map_err(|e| SignerError::SigningFailed(e.to_string()))?;
        Ok(Signature::new(signature.to_bytes().to_vec()))
    }

    fn verify(&self, message: &[u8], signature: &Signature, public_key: &PublicKey) -> bool {
        let Ok(key_bytes) = <[u8; 32]>::try_from(public_key.as_bytes()) else {
            return false;
        };
        let Ok(verifying_key) = VerifyingKey::from_bytes(&key_bytes) else {
            return false;
        };
        let Ok(signature) = ed25519_dalek::Signature::from_slice(signature.as_bytes()) else {
            return false;
        };
        verifying_key.verify(message, &signature).is_ok()
    }

    fn public_key(&self) -> PublicKey {
        PublicKey::new(self.key.verifying_key().to_bytes().to_vec())
    }
}
