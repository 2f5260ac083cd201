//! # Key Management
//!
//! Key pairs used across Keystone: BrainKey derives them, cards publish their
//! public halves, and Keyknox envelopes sign with and encrypt to them.
//!
//! ## Key Types
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          KEY TYPES                                      │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  KeyPair                                                               │
//! │  ├── SigningKeyPair (Ed25519)     card self-signatures,               │
//! │  │                                envelope signatures                 │
//! │  └── EncryptionKeyPair (X25519)   envelope recipient key              │
//! │                                                                         │
//! │  PublicKey (64 bytes on the wire)                                      │
//! │  ┌──────────────────────────────┬──────────────────────────────┐       │
//! │  │   Ed25519 public (32 bytes)  │   X25519 public (32 bytes)   │       │
//! │  └──────────────────────────────┴──────────────────────────────┘       │
//! │                                                                         │
//! │  Key identifier = SHA-512(PublicKey bytes)[0..8]                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};

/// Size of a serialized [`PublicKey`]
pub const PUBLIC_KEY_BYTES: usize = 64;

/// Size of a serialized private key (signing secret followed by encryption secret)
pub const PRIVATE_KEY_BYTES: usize = 64;

/// Size of a key identifier
pub const KEY_ID_SIZE: usize = 8;

/// Short identifier of a public key
pub type KeyIdentifier = [u8; KEY_ID_SIZE];

/// Combined keypair containing both signing and encryption keys
///
/// Private keys are zeroized when this struct is dropped.
#[derive(Clone, ZeroizeOnDrop)]
pub struct KeyPair {
    /// Ed25519 keypair for signing
    pub signing: SigningKeyPair,
    /// X25519 keypair for encryption
    pub encryption: EncryptionKeyPair,
}

impl KeyPair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        Self {
            signing: SigningKeyPair::generate(),
            encryption: EncryptionKeyPair::generate(),
        }
    }

    /// Create a keypair from a 32-byte seed
    ///
    /// Deterministic: the same seed always produces the same keys.
    ///
    /// ```text
    /// Seed (32 bytes)
    ///       │
    ///       ├──► HKDF(seed, "keystone-signing-key-v1")    → Signing Key
    ///       │
    ///       └──► HKDF(seed, "keystone-encryption-key-v1") → Encryption Key
    /// ```
    pub fn from_seed(seed: &[u8; 32]) -> Result<Self> {
        use crate::crypto::kdf::derive_keys_from_seed;

        let derived = derive_keys_from_seed(seed)?;

        Ok(Self {
            signing: SigningKeyPair::from_bytes(&derived.signing_key),
            encryption: EncryptionKeyPair::from_bytes(&derived.encryption_key),
        })
    }

    /// Restore a keypair from its exported private bytes
    pub fn from_private_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PRIVATE_KEY_BYTES {
            return Err(Error::InvalidKey(format!(
                "Private key must be {} bytes, got {}",
                PRIVATE_KEY_BYTES,
                bytes.len()
            )));
        }

        let mut signing = [0u8; 32];
        let mut encryption = [0u8; 32];
        signing.copy_from_slice(&bytes[..32]);
        encryption.copy_from_slice(&bytes[32..]);

        let pair = Self {
            signing: SigningKeyPair::from_bytes(&signing),
            encryption: EncryptionKeyPair::from_bytes(&encryption),
        };

        signing.zeroize();
        encryption.zeroize();
        Ok(pair)
    }

    /// Export the private key material
    ///
    /// ## Security Warning
    ///
    /// Only use this for encrypted storage. Never log or transmit these bytes.
    pub fn private_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(PRIVATE_KEY_BYTES);
        out.extend_from_slice(&self.signing.secret_bytes());
        out.extend_from_slice(&self.encryption.secret_bytes());
        out
    }

    /// Get the public keys for sharing with others
    pub fn public_keys(&self) -> PublicKey {
        PublicKey {
            signing: self.signing.public_bytes(),
            encryption: self.encryption.public_bytes(),
        }
    }

    /// Identifier of this pair's public key
    pub fn key_identifier(&self) -> KeyIdentifier {
        self.public_keys().key_identifier()
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public_keys().to_hex())
            .finish_non_exhaustive()
    }
}

/// Ed25519 signing keypair
#[derive(Clone, ZeroizeOnDrop)]
pub struct SigningKeyPair {
    #[zeroize(skip)] // ed25519_dalek::SigningKey handles its own zeroization
    secret: SigningKey,
}

impl SigningKeyPair {
    /// Generate a new random signing keypair
    pub fn generate() -> Self {
        Self {
            secret: SigningKey::generate(&mut OsRng),
        }
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            secret: SigningKey::from_bytes(bytes),
        }
    }

    /// Secret key bytes
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    /// Public key bytes
    pub fn public_bytes(&self) -> [u8; 32] {
        self.secret.verifying_key().to_bytes()
    }

    /// Verifying key for signature verification
    pub fn verifying_key(&self) -> VerifyingKey {
        self.secret.verifying_key()
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.secret
    }
}

/// X25519 encryption keypair
#[derive(Clone, ZeroizeOnDrop)]
pub struct EncryptionKeyPair {
    #[zeroize(skip)] // x25519_dalek handles its own zeroization
    secret: StaticSecret,
    #[zeroize(skip)]
    public: X25519PublicKey,
}

impl EncryptionKeyPair {
    /// Generate a new random encryption keypair
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        let secret = StaticSecret::from(*bytes);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Secret key bytes
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    /// Public key bytes
    pub fn public_bytes(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    /// X25519 Diffie-Hellman with a peer public key
    pub fn diffie_hellman(&self, their_public: &[u8; 32]) -> [u8; 32] {
        let their_public = X25519PublicKey::from(*their_public);
        self.secret.diffie_hellman(&their_public).to_bytes()
    }
}

/// Public half of a [`KeyPair`]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PublicKey {
    /// Ed25519 public key (32 bytes)
    #[serde(with = "hex_bytes")]
    pub signing: [u8; 32],

    /// X25519 public key (32 bytes)
    #[serde(with = "hex_bytes")]
    pub encryption: [u8; 32],
}

impl PublicKey {
    /// Create a PublicKey from its two halves
    pub fn from_parts(signing: [u8; 32], encryption: [u8; 32]) -> Self {
        Self { signing, encryption }
    }

    /// Decode the 64-byte wire form
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PUBLIC_KEY_BYTES {
            return Err(Error::InvalidKey(format!(
                "Public key must be {} bytes, got {}",
                PUBLIC_KEY_BYTES,
                bytes.len()
            )));
        }

        let mut signing = [0u8; 32];
        let mut encryption = [0u8; 32];
        signing.copy_from_slice(&bytes[..32]);
        encryption.copy_from_slice(&bytes[32..]);

        // Reject keys that are not valid curve points up front
        VerifyingKey::from_bytes(&signing)
            .map_err(|e| Error::InvalidKey(format!("Invalid signing public key: {}", e)))?;

        Ok(Self { signing, encryption })
    }

    /// Encode the 64-byte wire form
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_BYTES] {
        let mut out = [0u8; PUBLIC_KEY_BYTES];
        out[..32].copy_from_slice(&self.signing);
        out[32..].copy_from_slice(&self.encryption);
        out
    }

    /// Verifying key for signature verification
    pub fn verifying_key(&self) -> Result<VerifyingKey> {
        VerifyingKey::from_bytes(&self.signing)
            .map_err(|e| Error::InvalidKey(format!("Invalid signing public key: {}", e)))
    }

    /// First 8 bytes of SHA-512 over the wire form
    pub fn key_identifier(&self) -> KeyIdentifier {
        let digest = Sha512::digest(self.to_bytes());
        let mut id = [0u8; KEY_ID_SIZE];
        id.copy_from_slice(&digest[..KEY_ID_SIZE]);
        id
    }

    /// Encode as hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Decode from hex string
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        if hex_str.len() != PUBLIC_KEY_BYTES * 2 {
            return Err(Error::InvalidKey(
                "Public key hex must be 128 characters".into(),
            ));
        }

        let bytes =
            hex::decode(hex_str).map_err(|e| Error::InvalidKey(format!("Invalid hex: {}", e)))?;
        Self::from_slice(&bytes)
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("Invalid length"))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_generation() {
        let kp1 = KeyPair::generate();
        let kp2 = KeyPair::generate();

        assert_ne!(kp1.signing.public_bytes(), kp2.signing.public_bytes());
        assert_ne!(kp1.encryption.public_bytes(), kp2.encryption.public_bytes());
    }

    #[test]
    fn test_keypair_from_seed() {
        let seed = [42u8; 32];

        let kp1 = KeyPair::from_seed(&seed).unwrap();
        let kp2 = KeyPair::from_seed(&seed).unwrap();

        assert_eq!(kp1.public_keys(), kp2.public_keys());
    }

    #[test]
    fn test_private_bytes_restore() {
        let kp = KeyPair::generate();
        let restored = KeyPair::from_private_bytes(&kp.private_bytes()).unwrap();

        assert_eq!(kp.public_keys(), restored.public_keys());
        assert!(KeyPair::from_private_bytes(&[0u8; 12]).is_err());
    }

    #[test]
    fn test_diffie_hellman() {
        let alice = EncryptionKeyPair::generate();
        let bob = EncryptionKeyPair::generate();

        assert_eq!(
            alice.diffie_hellman(&bob.public_bytes()),
            bob.diffie_hellman(&alice.public_bytes())
        );
    }

    #[test]
    fn test_public_key_wire_form() {
        let public = KeyPair::generate().public_keys();

        let bytes = public.to_bytes();
        assert_eq!(&bytes[..32], &public.signing);
        assert_eq!(PublicKey::from_slice(&bytes).unwrap(), public);
        assert!(PublicKey::from_slice(&bytes[..63]).is_err());

        let restored = PublicKey::from_hex(&public.to_hex()).unwrap();
        assert_eq!(public, restored);
    }

    #[test]
    fn test_key_identifier() {
        let a = KeyPair::from_seed(&[1u8; 32]).unwrap();
        let b = KeyPair::from_seed(&[2u8; 32]).unwrap();

        assert_eq!(a.key_identifier(), a.public_keys().key_identifier());
        assert_ne!(a.key_identifier(), b.key_identifier());
    }
}
