//! # Key Store
//!
//! Encrypted local cache of identity key pairs.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         KEY STORE RECORD                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  name ──► nonce (12) ‖ AES-256-GCM(storage_key,                        │
//! │                          bincode { private_key, is_published },        │
//! │                          aad = name)                                   │
//! │                                                                         │
//! │  storage_key = HKDF(device_secret, salt = store_name,                  │
//! │                     info = "keystone-storage-encryption-v1")           │
//! │                                                                         │
//! │  Binding the name as AAD means a record moved to another name no       │
//! │  longer decrypts.                                                      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Reads are concurrent; writes take a short exclusive lock. Callers
//! serialize read-modify-write sequences for one identity.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::crypto::{
    decrypt, derive_storage_key, encrypt, EncryptionKey, KeyPair, Nonce, PublicKey, NONCE_SIZE,
};
use crate::error::{Error, Result};

/// An identity's key pair and whether its card is published
///
/// Only published identities may be backed up to the cloud.
#[derive(Clone)]
pub struct IdentityKeyPair {
    /// Private half
    pub private_key: KeyPair,
    /// Public half, as published on the card
    pub public_key: PublicKey,
    /// Set once the card carrying `public_key` is on the card service
    pub is_published: bool,
}

impl IdentityKeyPair {
    /// Wrap a key pair
    pub fn new(private_key: KeyPair, is_published: bool) -> Self {
        let public_key = private_key.public_keys();
        Self {
            private_key,
            public_key,
            is_published,
        }
    }
}

impl std::fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityKeyPair")
            .field("public_key", &self.public_key.to_hex())
            .field("is_published", &self.is_published)
            .finish()
    }
}

#[derive(Serialize, Deserialize)]
struct StoredRecord {
    private_key: Vec<u8>,
    is_published: bool,
}

/// Encrypted in-memory store of [`IdentityKeyPair`] records
pub struct KeyStore {
    records: RwLock<HashMap<String, Vec<u8>>>,
    encryption_key: EncryptionKey,
}

impl KeyStore {
    /// Store keyed from a device secret
    pub fn new(device_secret: &[u8], store_name: &str) -> Result<Self> {
        let key = derive_storage_key(device_secret, store_name)?;
        Ok(Self::with_key(key))
    }

    /// Store with an explicit encryption key
    pub fn with_key(key: [u8; 32]) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            encryption_key: EncryptionKey::from_bytes(key),
        }
    }

    /// Add a new record
    pub fn store(&self, name: &str, identity: &IdentityKeyPair) -> Result<()> {
        let sealed = self.seal(name, identity)?;
        let mut records = self.records.write();
        if records.contains_key(name) {
            return Err(Error::KeyAlreadyExists(name.to_string()));
        }
        records.insert(name.to_string(), sealed);
        Ok(())
    }

    /// Add or replace a record
    pub fn save(&self, name: &str, identity: &IdentityKeyPair) -> Result<()> {
        let sealed = self.seal(name, identity)?;
        self.records.write().insert(name.to_string(), sealed);
        Ok(())
    }

    /// Load and decrypt a record
    pub fn retrieve(&self, name: &str) -> Result<IdentityKeyPair> {
        let sealed = self
            .records
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::KeyNotFound(name.to_string()))?;
        self.open(name, &sealed)
    }

    /// Whether a record exists
    pub fn exists(&self, name: &str) -> bool {
        self.records.read().contains_key(name)
    }

    /// Remove a record
    pub fn delete(&self, name: &str) -> Result<()> {
        self.records
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::KeyNotFound(name.to_string()))
    }

    /// Set `is_published` on an existing record
    pub fn mark_published(&self, name: &str) -> Result<IdentityKeyPair> {
        let mut identity = self.retrieve(name)?;
        identity.is_published = true;
        self.save(name, &identity)?;
        Ok(identity)
    }

    /// Names of all records
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.records.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn seal(&self, name: &str, identity: &IdentityKeyPair) -> Result<Vec<u8>> {
        let record = StoredRecord {
            private_key: identity.private_key.private_bytes(),
            is_published: identity.is_published,
        };
        let plaintext = Zeroizing::new(bincode::serialize(&record)?);

        let (nonce, ciphertext) = encrypt(&self.encryption_key, &plaintext, name.as_bytes())?;
        let mut sealed = nonce.as_bytes().to_vec();
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    fn open(&self, name: &str, sealed: &[u8]) -> Result<IdentityKeyPair> {
        if sealed.len() < NONCE_SIZE {
            return Err(Error::StorageError("Stored record too short".into()));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
        let nonce: [u8; NONCE_SIZE] = nonce
            .try_into()
            .map_err(|_| Error::StorageError("Stored record too short".into()))?;

        let plaintext = Zeroizing::new(decrypt(
            &self.encryption_key,
            &Nonce::from_bytes(nonce),
            ciphertext,
            name.as_bytes(),
        )?);
        let record: StoredRecord = bincode::deserialize(&plaintext)?;
        let record_key = Zeroizing::new(record.private_key);

        Ok(IdentityKeyPair::new(
            KeyPair::from_private_bytes(&record_key)?,
            record.is_published,
        ))
    }
}

impl Default for KeyStore {
    fn default() -> Self {
        Self::with_key(*EncryptionKey::random().as_bytes())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_retrieve_delete() {
        let store = KeyStore::new(b"device secret", "keystone").unwrap();
        let identity = IdentityKeyPair::new(KeyPair::generate(), false);

        store.store("alice", &identity).unwrap();
        assert!(store.exists("alice"));

        let loaded = store.retrieve("alice").unwrap();
        assert_eq!(loaded.public_key, identity.public_key);
        assert_eq!(
            loaded.private_key.private_bytes(),
            identity.private_key.private_bytes()
        );
        assert!(!loaded.is_published);

        store.delete("alice").unwrap();
        assert!(!store.exists("alice"));
        assert!(matches!(store.retrieve("alice"), Err(Error::KeyNotFound(_))));
        assert!(matches!(store.delete("alice"), Err(Error::KeyNotFound(_))));
    }

    #[test]
    fn test_store_rejects_existing() {
        let store = KeyStore::default();
        let identity = IdentityKeyPair::new(KeyPair::generate(), false);
        store.store("alice", &identity).unwrap();

        assert!(matches!(
            store.store("alice", &identity),
            Err(Error::KeyAlreadyExists(_))
        ));

        // save overwrites
        let replacement = IdentityKeyPair::new(KeyPair::generate(), true);
        store.save("alice", &replacement).unwrap();
        assert_eq!(
            store.retrieve("alice").unwrap().public_key,
            replacement.public_key
        );
    }

    #[test]
    fn test_mark_published() {
        let store = KeyStore::default();
        store
            .store("alice", &IdentityKeyPair::new(KeyPair::generate(), false))
            .unwrap();

        assert!(store.mark_published("alice").unwrap().is_published);
        assert!(store.retrieve("alice").unwrap().is_published);
        assert!(store.mark_published("bob").is_err());
    }

    #[test]
    fn test_record_bound_to_name() {
        let store = KeyStore::default();
        store
            .store("alice", &IdentityKeyPair::new(KeyPair::generate(), false))
            .unwrap();

        let sealed = store.records.read().get("alice").cloned().unwrap();
        store.records.write().insert("mallory".into(), sealed);

        assert!(matches!(
            store.retrieve("mallory"),
            Err(Error::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_wrong_device_secret_cannot_read() {
        let store = KeyStore::new(b"device one", "keystone").unwrap();
        store
            .store("alice", &IdentityKeyPair::new(KeyPair::generate(), false))
            .unwrap();
        let sealed = store.records.read().get("alice").cloned().unwrap();

        let other = KeyStore::new(b"device two", "keystone").unwrap();
        other.records.write().insert("alice".into(), sealed);
        assert!(other.retrieve("alice").is_err());
    }

    #[test]
    fn test_names_sorted() {
        let store = KeyStore::default();
        for name in ["carol", "alice", "bob"] {
            store
                .store(name, &IdentityKeyPair::new(KeyPair::generate(), false))
                .unwrap();
        }
        assert_eq!(store.names(), vec!["alice", "bob", "carol"]);
    }
}
