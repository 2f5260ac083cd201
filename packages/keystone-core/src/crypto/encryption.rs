//! # Symmetric Encryption
//!
//! AES-256-GCM with random 96-bit nonces. Keyknox envelopes and the local key
//! store both encrypt through this module.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  encrypt(key, plaintext, aad) ──► (nonce, ciphertext ‖ tag)            │
//! │                                                                         │
//! │  decrypt(key, nonce, ciphertext ‖ tag, aad) ──► plaintext              │
//! │                                                                         │
//! │  Any mismatch in key, nonce, ciphertext or AAD fails the tag check     │
//! │  and surfaces as Error::DecryptionFailed.                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce as AesNonce,
};
use rand::RngCore;
use zeroize::ZeroizeOnDrop;

use crate::error::{Error, Result};

/// AES-GCM nonce size (96 bits)
pub const NONCE_SIZE: usize = 12;

/// AES-256 key size
pub const KEY_SIZE: usize = 32;

/// A random 96-bit nonce, stored next to the ciphertext it opened
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Nonce([u8; NONCE_SIZE]);

impl Nonce {
    /// Fresh random nonce
    pub fn random() -> Self {
        let mut bytes = [0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Nonce read back from storage
    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }
}

/// An AES-256-GCM key, zeroized on drop
///
/// Content keys of Keyknox envelopes, key-encryption keys derived per
/// recipient and the local key store key all take this form.
#[derive(Clone, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; KEY_SIZE]);

impl EncryptionKey {
    /// Key from raw bytes
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Fresh random key
    pub fn random() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Key recovered from an unwrapped byte string
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        slice.try_into().map(Self).map_err(|_| {
            Error::InvalidKey(format!(
                "symmetric key must be {} bytes, got {}",
                KEY_SIZE,
                slice.len()
            ))
        })
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0))
    }
}

/// Seal `plaintext` under a fresh nonce, binding `aad`
pub fn encrypt(key: &EncryptionKey, plaintext: &[u8], aad: &[u8]) -> Result<(Nonce, Vec<u8>)> {
    let nonce = Nonce::random();
    let ciphertext = key
        .cipher()
        .encrypt(
            AesNonce::from_slice(nonce.as_bytes()),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| Error::EncryptionFailed(e.to_string()))?;

    Ok((nonce, ciphertext))
}

/// Open a ciphertext sealed by [`encrypt`]
///
/// Any change to key, nonce, ciphertext or `aad` is `DecryptionFailed`.
pub fn decrypt(
    key: &EncryptionKey,
    nonce: &Nonce,
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    key.cipher()
        .decrypt(
            AesNonce::from_slice(nonce.as_bytes()),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| Error::DecryptionFailed("authentication tag mismatch".into()))
}

// ============================================================================
// TESTS
// ============================================================================
