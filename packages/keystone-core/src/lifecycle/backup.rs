//! Password-protected private key backup in Keyknox.
//!
//! Every operation re-derives the BrainKey pair for the password, scopes a
//! [`KeyknoxManager`] to it and performs a single Keyknox operation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::auth::AccessTokenProvider;
use crate::brainkey::BrainKey;
use crate::crypto::KeyPair;
use crate::encoding::base64_bytes;
use crate::error::{Error, Result};
use crate::keyknox::{DecryptedKeyknoxValue, KeyknoxClient, KeyknoxManager};

#[derive(Serialize, Deserialize)]
struct BackupPayload {
    identity: String,
    #[serde(with = "base64_bytes")]
    private_key: Vec<u8>,
}

impl Drop for BackupPayload {
    fn drop(&mut self) {
        zeroize::Zeroize::zeroize(&mut self.private_key);
    }
}

/// Backs up one identity's private key under a password
pub struct PasswordBackup {
    brainkey: Arc<BrainKey>,
    client: Arc<dyn KeyknoxClient>,
    tokens: Arc<dyn AccessTokenProvider>,
}

impl PasswordBackup {
    /// Assemble from collaborators
    pub fn new(
        brainkey: Arc<BrainKey>,
        client: Arc<dyn KeyknoxClient>,
        tokens: Arc<dyn AccessTokenProvider>,
    ) -> Self {
        Self {
            brainkey,
            client,
            tokens,
        }
    }

    async fn manager(&self, identity: &str, password: &str) -> Result<KeyknoxManager> {
        let key = self
            .brainkey
            .generate_key_pair(password, Some(identity))
            .await?;
        Ok(KeyknoxManager::for_self(
            self.client.clone(),
            self.tokens.clone(),
            key,
        ))
    }

    /// Store a key; fails with [`Error::EntryAlreadyExists`] if a backup exists
    pub async fn store_private_key(
        &self,
        identity: &str,
        private_key: &KeyPair,
        password: &str,
    ) -> Result<()> {
        let manager = self.manager(identity, password).await?;
        let data = encode(identity, private_key)?;

        match manager.push_value(&data, None).await {
            Ok(value) => {
                tracing::info!("Backed up key for {} at {}", identity, value.version);
                Ok(())
            }
            Err(Error::KeyknoxConflict) => Err(Error::EntryAlreadyExists(identity.to_string())),
            Err(e) => Err(e),
        }
    }

    /// Store a key, replacing any backup readable with `password`
    pub async fn replace_private_key(
        &self,
        identity: &str,
        private_key: &KeyPair,
        password: &str,
    ) -> Result<()> {
        let manager = self.manager(identity, password).await?;
        let current = manager.pull_value().await?;
        let data = encode(identity, private_key)?;

        let previous = (!current.is_empty()).then_some(current.keyknox_hash.as_slice());
        let value = manager.push_value(&data, previous).await?;
        tracing::info!("Replaced key backup for {} at {}", identity, value.version);
        Ok(())
    }

    /// Recover the backed up key
    pub async fn retrieve_private_key(&self, identity: &str, password: &str) -> Result<KeyPair> {
        let manager = self.manager(identity, password).await?;
        let value = manager.pull_value().await?;
        decode(identity, &value)
    }

    /// Delete the backup after proving `password` can read it
    pub async fn delete_private_key(&self, identity: &str, password: &str) -> Result<()> {
        let manager = self.manager(identity, password).await?;
        let value = manager.pull_value().await?;
        if value.is_empty() {
            return Err(Error::EntryNotFound(identity.to_string()));
        }

        manager.reset_value().await?;
        tracing::info!("Deleted key backup for {}", identity);
        Ok(())
    }

    /// Re-encrypt the backup under a new password
    ///
    /// The push names the hash that was read with the old password, so a
    /// concurrent change makes this fail with [`Error::KeyknoxConflict`]
    /// instead of overwriting it.
    pub async fn change_password(
        &self,
        identity: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<()> {
        let old = self.manager(identity, old_password).await?;
        let current = old.pull_value().await?;
        if current.is_empty() {
            return Err(Error::EntryNotFound(identity.to_string()));
        }
        let private_key = decode(identity, &current)?;

        let new = self.manager(identity, new_password).await?;
        let data = encode(identity, &private_key)?;
        let value = new
            .push_value(&data, Some(&current.keyknox_hash))
            .await?;

        tracing::info!("Changed backup password for {} at {}", identity, value.version);
        Ok(())
    }
}

fn encode(identity: &str, private_key: &KeyPair) -> Result<Zeroizing<Vec<u8>>> {
    let payload = BackupPayload {
        identity: identity.to_string(),
        private_key: private_key.private_bytes(),
    };
    Ok(Zeroizing::new(serde_json::to_vec(&payload)?))
}

fn decode(identity: &str, value: &DecryptedKeyknoxValue) -> Result<KeyPair> {
    if value.is_empty() {
        return Err(Error::EntryNotFound(identity.to_string()));
    }

    let payload: BackupPayload = serde_json::from_slice(&value.value)?;
    if payload.identity != identity {
        return Err(Error::BackupIdentityMismatch {
            expected: identity.to_string(),
            found: payload.identity.clone(),
        });
    }
    KeyPair::from_private_bytes(&payload.private_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyknox::KeyknoxVersion;

    fn value(data: &[u8]) -> DecryptedKeyknoxValue {
        DecryptedKeyknoxValue {
            meta: Vec::new(),
            value: data.to_vec(),
            version: KeyknoxVersion::INITIAL,
            keyknox_hash: Vec::new(),
        }
    }

    #[test]
    fn test_decode_round_trip() {
        let key = KeyPair::generate();
        let data = encode("alice", &key).unwrap();

        let decoded = decode("alice", &value(&data)).unwrap();
        assert_eq!(decoded.public_keys(), key.public_keys());
    }

    #[test]
    fn test_decode_identity_mismatch() {
        let data = encode("alice", &KeyPair::generate()).unwrap();

        let err = decode("bob", &value(&data)).unwrap_err();
        match err {
            Error::BackupIdentityMismatch { expected, found } => {
                assert_eq!(expected, "bob");
                assert_eq!(found, "alice");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_decode_empty_is_not_found() {
        let err = decode("alice", &value(&[])).unwrap_err();
        assert!(matches!(err, Error::EntryNotFound(_)));
    }
}
