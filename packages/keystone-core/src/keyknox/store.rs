//! Server half of Keyknox: one value per owner, replaced by compare-and-set.

use std::collections::HashMap;

use parking_lot::RwLock;

use super::{keyknox_hash, EncryptedKeyknoxValue, KeyknoxVersion};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
struct Slot {
    meta: Vec<u8>,
    value: Vec<u8>,
    version: KeyknoxVersion,
    hash: Vec<u8>,
}

impl Slot {
    fn empty(version: KeyknoxVersion) -> Self {
        Self {
            meta: Vec::new(),
            value: Vec::new(),
            version,
            hash: keyknox_hash(&[], &[]),
        }
    }

    fn is_empty(&self) -> bool {
        self.meta.is_empty() && self.value.is_empty()
    }

    fn to_value(&self) -> EncryptedKeyknoxValue {
        EncryptedKeyknoxValue {
            meta: self.meta.clone(),
            value: self.value.clone(),
            version: self.version,
            keyknox_hash: self.hash.clone(),
        }
    }
}

/// Stores encrypted Keyknox values keyed by owner
#[derive(Debug, Default)]
pub struct KeyknoxStore {
    slots: RwLock<HashMap<String, Slot>>,
}

impl KeyknoxStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the owner's value
    ///
    /// `previous_hash` must equal the stored hash. It may only be omitted
    /// while nothing is stored. The check and the write happen under one
    /// lock, so of two pushes against the same hash exactly one wins.
    pub fn push(
        &self,
        owner: &str,
        meta: Vec<u8>,
        value: Vec<u8>,
        previous_hash: Option<&[u8]>,
    ) -> Result<EncryptedKeyknoxValue> {
        if meta.is_empty() || value.is_empty() {
            return Err(Error::InvalidInput(
                "meta and value must not be empty".into(),
            ));
        }

        let mut slots = self.slots.write();
        let slot = slots
            .entry(owner.to_string())
            .or_insert_with(|| Slot::empty(KeyknoxVersion::INITIAL));

        let accepted = match previous_hash {
            Some(hash) => hash == slot.hash.as_slice(),
            None => slot.is_empty(),
        };
        if !accepted {
            tracing::debug!("Rejected stale keyknox push for {}", owner);
            return Err(Error::KeyknoxConflict);
        }

        slot.hash = keyknox_hash(&meta, &value);
        slot.meta = meta;
        slot.value = value;
        slot.version = slot.version.next_minor();

        tracing::debug!("Keyknox value for {} now at {}", owner, slot.version);
        Ok(slot.to_value())
    }

    /// The owner's current value, empty when never written
    pub fn pull(&self, owner: &str) -> EncryptedKeyknoxValue {
        self.slots
            .read()
            .get(owner)
            .map(Slot::to_value)
            .unwrap_or_else(|| Slot::empty(KeyknoxVersion::INITIAL).to_value())
    }

    /// Drop the owner's value and start a new major version
    pub fn reset(&self, owner: &str) -> EncryptedKeyknoxValue {
        let mut slots = self.slots.write();
        let slot = slots
            .entry(owner.to_string())
            .or_insert_with(|| Slot::empty(KeyknoxVersion::INITIAL));
        *slot = Slot::empty(slot.version.next_major());

        tracing::info!("Reset keyknox value for {} to {}", owner, slot.version);
        slot.to_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_fresh_owner_is_empty() {
        let store = KeyknoxStore::new();
        let value = store.pull("alice");
        assert!(value.is_empty());
        assert_eq!(value.version, KeyknoxVersion::INITIAL);
        assert_eq!(value.keyknox_hash, keyknox_hash(&[], &[]));
    }

    #[test]
    fn test_push_chain() {
        let store = KeyknoxStore::new();

        let first = store.push("alice", b"m1".to_vec(), b"v1".to_vec(), None).unwrap();
        assert_eq!(first.version.to_string(), "1.1");
        assert_eq!(first.keyknox_hash, keyknox_hash(b"m1", b"v1"));

        let second = store
            .push("alice", b"m2".to_vec(), b"v2".to_vec(), Some(&first.keyknox_hash))
            .unwrap();
        assert_eq!(second.version.to_string(), "1.2");
        assert_eq!(store.pull("alice"), second);

        // Owners are independent
        assert!(store.pull("bob").is_empty());
    }

    #[test]
    fn test_stale_or_missing_hash_conflicts() {
        let store = KeyknoxStore::new();
        let first = store.push("alice", b"m1".to_vec(), b"v1".to_vec(), None).unwrap();

        assert!(matches!(
            store.push("alice", b"m2".to_vec(), b"v2".to_vec(), None),
            Err(Error::KeyknoxConflict)
        ));
        assert!(matches!(
            store.push("alice", b"m2".to_vec(), b"v2".to_vec(), Some(b"bogus")),
            Err(Error::KeyknoxConflict)
        ));
        assert_eq!(store.pull("alice"), first);
    }

    #[test]
    fn test_empty_hash_accepted_on_empty_slot() {
        let store = KeyknoxStore::new();
        let empty = store.pull("alice");
        let pushed = store
            .push("alice", b"m".to_vec(), b"v".to_vec(), Some(&empty.keyknox_hash))
            .unwrap();
        assert_eq!(pushed.version.to_string(), "1.1");
    }

    #[test]
    fn test_reset_bumps_major() {
        let store = KeyknoxStore::new();
        store.push("alice", b"m".to_vec(), b"v".to_vec(), None).unwrap();
        store.push("alice", b"m".to_vec(), b"w".to_vec(), Some(&keyknox_hash(b"m", b"v"))).unwrap();

        let reset = store.reset("alice");
        assert!(reset.is_empty());
        assert_eq!(reset.version.to_string(), "2.0");

        let after = store.push("alice", b"m".to_vec(), b"v".to_vec(), None).unwrap();
        assert_eq!(after.version.to_string(), "2.1");
    }

    #[test]
    fn test_rejects_empty_push() {
        let store = KeyknoxStore::new();
        assert!(matches!(
            store.push("alice", Vec::new(), b"v".to_vec(), None),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_concurrent_stale_pushes_one_wins() {
        let store = Arc::new(KeyknoxStore::new());
        let base = store.push("alice", b"m".to_vec(), b"v".to_vec(), None).unwrap();

        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let store = store.clone();
                let hash = base.keyknox_hash.clone();
                std::thread::spawn(move || {
                    store
                        .push("alice", b"m".to_vec(), vec![i + 1], Some(&hash))
                        .is_ok()
                })
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(wins, 1);
        assert_eq!(store.pull("alice").version.to_string(), "1.2");
    }
}
