//! # Key Derivation Functions
//!
//! HKDF-SHA256 derivations used by Keystone.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    KEY DERIVATION HIERARCHY                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Deblinded OPRF output                                                 │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  HKDF(ikm = deblinded, salt = brainKeyId,                              │
//! │       info = "keystone-brainkey-v1")          → 32-byte seed           │
//! │        │                                                                │
//! │        ├──► HKDF(seed, "keystone-signing-key-v1")    → Ed25519         │
//! │        └──► HKDF(seed, "keystone-encryption-key-v1") → X25519          │
//! │                                                                         │
//! │  Envelope recipient                                                    │
//! │                                                                         │
//! │  HKDF(ikm = X25519(ephemeral, recipient),                              │
//! │       salt = ephemeral_public ‖ recipient_key_id,                      │
//! │       info = "keystone-keyknox-wrap-v1")      → key-wrapping key       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::ZeroizeOnDrop;

use crate::error::{Error, Result};

/// Domain separation strings for HKDF
pub mod domain {
    /// Signing key derivation
    pub const SIGNING_KEY: &[u8] = b"keystone-signing-key-v1";

    /// Encryption key derivation
    pub const ENCRYPTION_KEY: &[u8] = b"keystone-encryption-key-v1";

    /// BrainKey seed derivation
    pub const BRAINKEY_SEED: &[u8] = b"keystone-brainkey-v1";

    /// Keyknox content-key wrapping
    pub const KEYKNOX_WRAP: &[u8] = b"keystone-keyknox-wrap-v1";

    /// Local key store encryption
    pub const STORAGE_ENCRYPTION: &[u8] = b"keystone-storage-encryption-v1";
}

/// Keys derived from a master seed
#[derive(ZeroizeOnDrop)]
pub struct DerivedKeys {
    /// Ed25519 signing key (32 bytes)
    pub signing_key: [u8; 32],

    /// X25519 encryption key (32 bytes)
    pub encryption_key: [u8; 32],
}

/// Derive signing and encryption keys from a master seed
pub fn derive_keys_from_seed(seed: &[u8; 32]) -> Result<DerivedKeys> {
    let hkdf = Hkdf::<Sha256>::new(None, seed);

    let mut signing_key = [0u8; 32];
    hkdf.expand(domain::SIGNING_KEY, &mut signing_key)
        .map_err(|_| Error::KeyDerivationFailed("Failed to derive signing key".into()))?;

    let mut encryption_key = [0u8; 32];
    hkdf.expand(domain::ENCRYPTION_KEY, &mut encryption_key)
        .map_err(|_| Error::KeyDerivationFailed("Failed to derive encryption key".into()))?;

    Ok(DerivedKeys {
        signing_key,
        encryption_key,
    })
}

/// Turn a deblinded OPRF output into a key pair seed
///
/// The BrainKey id is the salt, so two ids never share a seed even if a
/// transformation service were to ignore the tweak.
pub fn derive_brainkey_seed(deblinded: &[u8], brainkey_id: &str) -> Result<[u8; 32]> {
    let hkdf = Hkdf::<Sha256>::new(Some(brainkey_id.as_bytes()), deblinded);

    let mut seed = [0u8; 32];
    hkdf.expand(domain::BRAINKEY_SEED, &mut seed)
        .map_err(|_| Error::KeyDerivationFailed("Failed to derive brainkey seed".into()))?;

    Ok(seed)
}

/// Derive the key that wraps an envelope content key for one recipient
pub fn derive_wrapping_key(
    dh_output: &[u8; 32],
    ephemeral_public: &[u8; 32],
    recipient_id: &[u8],
) -> Result<[u8; 32]> {
    let mut salt = Vec::with_capacity(32 + recipient_id.len());
    salt.extend_from_slice(ephemeral_public);
    salt.extend_from_slice(recipient_id);

    let hkdf = Hkdf::<Sha256>::new(Some(&salt), dh_output);

    let mut key = [0u8; 32];
    hkdf.expand(domain::KEYKNOX_WRAP, &mut key)
        .map_err(|_| Error::KeyDerivationFailed("Failed to derive wrapping key".into()))?;

    Ok(key)
}

/// Derive a storage encryption key from a device secret and a store name
pub fn derive_storage_key(device_secret: &[u8], store_name: &str) -> Result<[u8; 32]> {
    let hkdf = Hkdf::<Sha256>::new(Some(store_name.as_bytes()), device_secret);

    let mut key = [0u8; 32];
    hkdf.expand(domain::STORAGE_ENCRYPTION, &mut key)
        .map_err(|_| Error::KeyDerivationFailed("Failed to derive storage key".into()))?;

    Ok(key)
}

// ============================================================================
// TESTS
// ============================================================================
