//! # Digital Signatures
//!
//! Ed25519 signatures, used for card signatures and for the detached
//! signature inside every Keyknox envelope.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  sign(keypair, message)            verify(public, message, signature)  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  message ──► Ed25519 (SHA-512) ──► 64-byte signature                   │
//! │                                                                         │
//! │  Deterministic: the same key and message always yield the same         │
//! │  signature. Verification failure is Error::VerificationFailed.         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use ed25519_dalek::{Signature as Ed25519Signature, Signer, Verifier, VerifyingKey};

use crate::crypto::SigningKeyPair;
use crate::error::{Error, Result};

/// Size of an Ed25519 signature in bytes
pub const SIGNATURE_SIZE: usize = 64;

/// A detached Ed25519 signature
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Signature([u8; SIGNATURE_SIZE]);

impl Signature {
    /// Parse a wire signature
    ///
    /// Card and envelope signatures travel as plain byte strings, so the
    /// length is only known here.
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        slice.try_into().map(Self).map_err(|_| {
            Error::InvalidInput(format!(
                "signature must be {} bytes, got {}",
                SIGNATURE_SIZE,
                slice.len()
            ))
        })
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.0
    }
}

/// Sign `message` with the signing half of a key pair
pub fn sign(keypair: &SigningKeyPair, message: &[u8]) -> Signature {
    Signature(keypair.signing_key().sign(message).to_bytes())
}

/// Check a signature against a raw Ed25519 public key
///
/// A bad signature is `VerificationFailed`; a public key that is not a curve
/// point is `InvalidKey`.
pub fn verify(public_key: &[u8; 32], message: &[u8], signature: &Signature) -> Result<()> {
    let verifying_key = VerifyingKey::from_bytes(public_key)
        .map_err(|e| Error::InvalidKey(format!("not an Ed25519 point: {}", e)))?;

    verifying_key
        .verify(message, &Ed25519Signature::from_bytes(&signature.0))
        .map_err(|_| Error::VerificationFailed)
}

/// [`verify`] for a signature of unchecked length
///
/// A wrong length counts as a failed verification, not as malformed input.
pub fn verify_slice(public_key: &[u8; 32], message: &[u8], signature: &[u8]) -> Result<()> {
    let signature = Signature::from_slice(signature).map_err(|_| Error::VerificationFailed)?;
    verify(public_key, message, &signature)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify() {
        let keypair = SigningKeyPair::generate();
        let message = b"card snapshot";

        let signature = sign(&keypair, message);
        assert!(verify(&keypair.public_bytes(), message, &signature).is_ok());
    }

    #[test]
    fn test_wrong_message_fails() {
        let keypair = SigningKeyPair::generate();
        let signature = sign(&keypair, b"original");

        let result = verify(&keypair.public_bytes(), b"tampered", &signature);
        assert!(matches!(result, Err(Error::VerificationFailed)));
    }

    #[test]
    fn test_wrong_key_fails() {
        let alice = SigningKeyPair::generate();
        let bob = SigningKeyPair::generate();
        let signature = sign(&alice, b"hello");

        assert!(verify(&bob.public_bytes(), b"hello", &signature).is_err());
    }

    #[test]
    fn test_verify_slice_rejects_short_signature() {
        let keypair = SigningKeyPair::generate();
        let result = verify_slice(&keypair.public_bytes(), b"x", &[0u8; 10]);
        assert!(matches!(result, Err(Error::VerificationFailed)));
    }

    #[test]
    fn test_signature_deterministic() {
        let keypair = SigningKeyPair::from_bytes(&[9u8; 32]);
        assert_eq!(sign(&keypair, b"m"), sign(&keypair, b"m"));
    }
}
