//! # Keyknox
//!
//! End-to-end encrypted blob sync with optimistic concurrency.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           KEYKNOX FLOW                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  CloudKeyStorage        named entries, serialized as one JSON map      │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  KeyknoxManager         sign + encrypt for recipients, verify + decrypt│
//! │        │                                                                │
//! │        ▼                                                                │
//! │  KeyknoxClient          PUT / GET / reset, previous-hash CAS           │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  KeyknoxStore           one (meta, value, version, hash) per owner     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The service never sees plaintext. Every push names the hash of the value
//! it replaces; a stale hash is rejected with [`Error::KeyknoxConflict`].
//!
//! [`Error::KeyknoxConflict`]: crate::error::Error::KeyknoxConflict

mod client;
mod cloud;
mod crypto;
mod manager;
mod store;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use client::{
    HttpKeyknoxClient, KeyknoxClient, KeyknoxPushRequest, KeyknoxResponse, MemoryKeyknoxClient,
    HASH_HEADER, KEYKNOX_PATH, PREVIOUS_HASH_HEADER,
};
pub use cloud::{CloudEntry, CloudKeyStorage, NewEntry};
pub use crypto::{KeyknoxCrypto, ENVELOPE_VERSION};
pub use manager::KeyknoxManager;
pub use store::KeyknoxStore;

/// Version of a stored value as `major.minor`
///
/// Pushes bump the minor number. A reset bumps the major number and sets
/// minor back to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyknoxVersion {
    /// Incremented by reset
    pub major: u64,
    /// Incremented by push
    pub minor: u64,
}

impl KeyknoxVersion {
    /// Version of a value that was never written
    pub const INITIAL: Self = Self { major: 1, minor: 0 };

    /// Version after a push
    pub fn next_minor(self) -> Self {
        Self {
            major: self.major,
            minor: self.minor + 1,
        }
    }

    /// Version after a reset
    pub fn next_major(self) -> Self {
        Self {
            major: self.major + 1,
            minor: 0,
        }
    }
}

impl Default for KeyknoxVersion {
    fn default() -> Self {
        Self::INITIAL
    }
}

impl fmt::Display for KeyknoxVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for KeyknoxVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::ProtocolError(format!("invalid keyknox version: {:?}", s));
        let (major, minor) = s.split_once('.').ok_or_else(invalid)?;
        Ok(Self {
            major: major.parse().map_err(|_| invalid())?,
            minor: minor.parse().map_err(|_| invalid())?,
        })
    }
}

impl Serialize for KeyknoxVersion {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for KeyknoxVersion {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A value as the service stores it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedKeyknoxValue {
    /// Envelope header
    pub meta: Vec<u8>,
    /// Ciphertext
    pub value: Vec<u8>,
    /// Current version
    pub version: KeyknoxVersion,
    /// SHA-256 over `meta ‖ value`, the token for the next push
    pub keyknox_hash: Vec<u8>,
}

impl EncryptedKeyknoxValue {
    /// Whether nothing is stored
    pub fn is_empty(&self) -> bool {
        self.meta.is_empty() && self.value.is_empty()
    }
}

/// A value after decryption and signature verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedKeyknoxValue {
    /// Envelope header, as stored
    pub meta: Vec<u8>,
    /// Plaintext
    pub value: Vec<u8>,
    /// Current version
    pub version: KeyknoxVersion,
    /// Hash to pass as `previous_hash` on the next push
    pub keyknox_hash: Vec<u8>,
}

impl DecryptedKeyknoxValue {
    /// Whether nothing is stored
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

/// Hash the service assigns to a stored value
pub fn keyknox_hash(meta: &[u8], value: &[u8]) -> Vec<u8> {
    let mut joined = Vec::with_capacity(meta.len() + value.len());
    joined.extend_from_slice(meta);
    joined.extend_from_slice(value);
    crate::crypto::sha256(&joined).to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_progression() {
        let v = KeyknoxVersion::INITIAL;
        assert_eq!(v.to_string(), "1.0");
        assert_eq!(v.next_minor().next_minor().to_string(), "1.2");
        assert_eq!(v.next_minor().next_major().to_string(), "2.0");
    }

    #[test]
    fn test_version_parse() {
        assert_eq!(
            "3.14".parse::<KeyknoxVersion>().unwrap(),
            KeyknoxVersion { major: 3, minor: 14 }
        );
        assert!("3".parse::<KeyknoxVersion>().is_err());
        assert!("a.b".parse::<KeyknoxVersion>().is_err());

        let json = serde_json::to_string(&KeyknoxVersion::INITIAL).unwrap();
        assert_eq!(json, "\"1.0\"");
        let back: KeyknoxVersion = serde_json::from_str(&json).unwrap();
        assert_eq!(back, KeyknoxVersion::INITIAL);
    }

    #[test]
    fn test_hash_covers_meta_and_value() {
        assert_eq!(keyknox_hash(b"", b""), crate::crypto::sha256(b"").to_vec());
        assert_ne!(keyknox_hash(b"a", b"b"), keyknox_hash(b"b", b"a"));
    }
}
