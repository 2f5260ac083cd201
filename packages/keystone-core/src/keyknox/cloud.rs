//! # Cloud Key Storage
//!
//! Named key entries kept in a single Keyknox value.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Keyknox value (plaintext) = JSON map                                  │
//! │                                                                         │
//! │  {                                                                      │
//! │    "alice-main":   { name, data, creation_date, modification_date,     │
//! │                      meta? },                                          │
//! │    "alice-backup": { ... }                                             │
//! │  }                                                                      │
//! │                                                                         │
//! │  Every write: modify the cached map ──► push with last known hash      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Writes from one [`CloudKeyStorage`] are serialized through an async lock.
//! A write from another device surfaces as [`Error::KeyknoxConflict`]; call
//! [`CloudKeyStorage::retrieve_cloud_entries`] to resync and try again.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::manager::KeyknoxManager;
use super::DecryptedKeyknoxValue;
use crate::crypto::{KeyPair, PublicKey};
use crate::encoding::base64_bytes;
use crate::error::{Error, Result};
use crate::time::now_timestamp;

/// One named key in cloud storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudEntry {
    /// Unique name
    pub name: String,
    /// Key material
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    /// Unix seconds when first stored
    pub creation_date: i64,
    /// Unix seconds of the last update
    pub modification_date: i64,
    /// Application metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<HashMap<String, String>>,
}

/// Input to [`CloudKeyStorage::store_entries`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    /// Unique name
    pub name: String,
    /// Key material
    pub data: Vec<u8>,
    /// Application metadata
    pub meta: Option<HashMap<String, String>>,
}

impl NewEntry {
    /// Entry without metadata
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
            meta: None,
        }
    }
}

type Entries = BTreeMap<String, CloudEntry>;

struct CloudState {
    manager: KeyknoxManager,
    entries: Entries,
    last_hash: Option<Vec<u8>>,
    synced: bool,
}

impl CloudState {
    fn apply(&mut self, value: &DecryptedKeyknoxValue) -> Result<()> {
        self.entries = decode_entries(&value.value)?;
        self.last_hash = Some(value.keyknox_hash.clone());
        self.synced = true;
        Ok(())
    }

    async fn sync(&mut self) -> Result<()> {
        let value = self.manager.pull_value().await?;
        self.apply(&value)
    }

    async fn ensure_synced(&mut self) -> Result<()> {
        if !self.synced {
            self.sync().await?;
        }
        Ok(())
    }

    async fn push(&mut self, entries: Entries) -> Result<()> {
        let data = serde_json::to_vec(&entries)?;
        let value = self
            .manager
            .push_value(&data, self.last_hash.as_deref())
            .await?;
        self.apply(&value)
    }
}

fn decode_entries(data: &[u8]) -> Result<Entries> {
    if data.is_empty() {
        return Ok(Entries::new());
    }
    Ok(serde_json::from_slice(data)?)
}

/// Multiple named keys on top of a [`KeyknoxManager`]
pub struct CloudKeyStorage {
    state: Mutex<CloudState>,
}

impl CloudKeyStorage {
    /// Storage over a manager; nothing is fetched until first use
    pub fn new(manager: KeyknoxManager) -> Self {
        Self {
            state: Mutex::new(CloudState {
                manager,
                entries: Entries::new(),
                last_hash: None,
                synced: false,
            }),
        }
    }

    /// Pull the value and refresh the local copy
    pub async fn retrieve_cloud_entries(&self) -> Result<Vec<CloudEntry>> {
        let mut state = self.state.lock().await;
        state.sync().await?;
        Ok(state.entries.values().cloned().collect())
    }

    /// Store one new entry
    pub async fn store_entry(
        &self,
        name: &str,
        data: &[u8],
        meta: Option<HashMap<String, String>>,
    ) -> Result<CloudEntry> {
        let mut stored = self
            .store_entries(vec![NewEntry {
                name: name.to_string(),
                data: data.to_vec(),
                meta,
            }])
            .await?;
        stored
            .pop()
            .ok_or_else(|| Error::Internal("store_entries returned nothing".into()))
    }

    /// Store several new entries in one push
    ///
    /// Fails with [`Error::EntryAlreadyExists`] if any name is taken or
    /// repeated; nothing is written in that case.
    pub async fn store_entries(&self, new_entries: Vec<NewEntry>) -> Result<Vec<CloudEntry>> {
        let mut state = self.state.lock().await;
        state.ensure_synced().await?;

        let now = now_timestamp();
        let mut entries = state.entries.clone();
        let mut stored = Vec::with_capacity(new_entries.len());
        for new in new_entries {
            if entries.contains_key(&new.name) {
                return Err(Error::EntryAlreadyExists(new.name));
            }
            let entry = CloudEntry {
                name: new.name.clone(),
                data: new.data,
                creation_date: now,
                modification_date: now,
                meta: new.meta,
            };
            entries.insert(new.name, entry.clone());
            stored.push(entry);
        }

        state.push(entries).await?;
        tracing::debug!("Stored {} cloud entries", stored.len());
        Ok(stored)
    }

    /// One entry from the local copy
    pub async fn retrieve_entry(&self, name: &str) -> Result<CloudEntry> {
        let mut state = self.state.lock().await;
        state.ensure_synced().await?;
        state
            .entries
            .get(name)
            .cloned()
            .ok_or_else(|| Error::EntryNotFound(name.to_string()))
    }

    /// Every entry from the local copy
    pub async fn retrieve_all_entries(&self) -> Result<Vec<CloudEntry>> {
        let mut state = self.state.lock().await;
        state.ensure_synced().await?;
        Ok(state.entries.values().cloned().collect())
    }

    /// Whether an entry exists in the local copy
    pub async fn exists_entry(&self, name: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        state.ensure_synced().await?;
        Ok(state.entries.contains_key(name))
    }

    /// Replace the data of an existing entry
    ///
    /// `meta` of `None` keeps the current metadata.
    pub async fn update_entry(
        &self,
        name: &str,
        data: &[u8],
        meta: Option<HashMap<String, String>>,
    ) -> Result<CloudEntry> {
        let mut state = self.state.lock().await;
        state.ensure_synced().await?;

        let mut entries = state.entries.clone();
        let entry = entries
            .get_mut(name)
            .ok_or_else(|| Error::EntryNotFound(name.to_string()))?;
        entry.data = data.to_vec();
        entry.modification_date = now_timestamp();
        if meta.is_some() {
            entry.meta = meta;
        }
        let updated = entry.clone();

        state.push(entries).await?;
        Ok(updated)
    }

    /// Remove one entry
    pub async fn delete_entry(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.ensure_synced().await?;

        let mut entries = state.entries.clone();
        if entries.remove(name).is_none() {
            return Err(Error::EntryNotFound(name.to_string()));
        }

        state.push(entries).await
    }

    /// Remove every entry by resetting the Keyknox value
    pub async fn delete_all_entries(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let value = state.manager.reset_value().await?;
        state.apply(&value)?;
        tracing::info!("Deleted all cloud entries");
        Ok(())
    }

    /// Re-encrypt the stored entries for a new set of recipients
    pub async fn update_recipients(
        &self,
        new_public_keys: Vec<PublicKey>,
        new_private_key: Option<KeyPair>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let value = state
            .manager
            .update_recipients(new_public_keys, new_private_key)
            .await?;
        state.apply(&value)
    }
}

// ============================================================================
// TESTS
// ============================================================================
