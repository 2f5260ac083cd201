//! # Cryptography Module
//!
//! Classical primitives shared by the Keystone subsystems. The OPRF used by
//! BrainKey lives in [`crate::oprf`]; everything else builds on this module.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    CRYPTOGRAPHIC ARCHITECTURE                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  BrainKey seed (32 bytes)                                              │
//! │        │                                                                │
//! │        ├──► Ed25519 signing key   card self-signature,                 │
//! │        │                          Keyknox envelope signature           │
//! │        └──► X25519 encryption key Keyknox envelope recipient           │
//! │                                                                         │
//! │  Keyknox envelope                                                      │
//! │   content key (random) ──► AES-256-GCM(data), AES-256-GCM(params)      │
//! │   per recipient: X25519(ephemeral, recipient) ─HKDF─► wrap content key │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! | Algorithm | Purpose |
//! |-----------|---------|
//! | Ed25519 | Card and envelope signatures |
//! | X25519 | Envelope key agreement |
//! | AES-256-GCM | Envelope and local store encryption |
//! | HKDF-SHA256 | Seed expansion, key wrapping |
//! | SHA-512 | Card ids, key identifiers |

mod encryption;
mod kdf;
mod keys;
mod signing;

pub use encryption::{decrypt, encrypt, EncryptionKey, Nonce, KEY_SIZE, NONCE_SIZE};
pub use kdf::{
    derive_brainkey_seed, derive_keys_from_seed, derive_storage_key, derive_wrapping_key,
    DerivedKeys,
};
pub use keys::{
    EncryptionKeyPair, KeyIdentifier, KeyPair, PublicKey, SigningKeyPair, KEY_ID_SIZE,
    PRIVATE_KEY_BYTES, PUBLIC_KEY_BYTES,
};
pub use signing::{sign, verify, verify_slice, Signature, SIGNATURE_SIZE};

use sha2::{Digest, Sha256, Sha512};

/// SHA-256 digest
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// SHA-512 digest
pub fn sha512(data: &[u8]) -> [u8; 64] {
    let mut out = [0u8; 64];
    out.copy_from_slice(&Sha512::digest(data));
    out
}
