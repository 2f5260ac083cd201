//! # Key Lifecycle
//!
//! Bootstrap, backup, restore and rotation of one identity's key, composed
//! from BrainKey, cards, Keyknox and the local key store.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          KEY LIFECYCLE                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  bootstrap(pw?)                                                        │
//! │    generate key ──► store locally (unpublished)                        │
//! │                 ──► publish card ──► mark published ──► backup(pw)?    │
//! │                                                                         │
//! │  backup(pw)      local key, must be published ──► Keyknox under        │
//! │                  BrainKey(pw, identity)                                │
//! │                                                                         │
//! │  restore(pw)     Keyknox ──► decrypt with BrainKey(pw, identity)       │
//! │                          ──► store locally                             │
//! │                                                                         │
//! │  rotate(pw?)     new key ──► card naming the current one as previous   │
//! │                          ──► replace local key ──► replace backup?     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A card is published before its key is ever backed up, so a backup never
//! holds a key nobody can verify.

mod backup;

pub use backup::PasswordBackup;

use std::sync::Arc;

use crate::cards::{Card, CardManager};
use crate::crypto::KeyPair;
use crate::error::{Error, Result};
use crate::storage::{IdentityKeyPair, KeyStore};

/// Runs key lifecycle flows for one identity
pub struct KeyLifecycle {
    identity: String,
    cards: Arc<CardManager>,
    backup: PasswordBackup,
    key_store: Arc<KeyStore>,
}

impl KeyLifecycle {
    /// Assemble from collaborators
    pub fn new(
        identity: impl Into<String>,
        cards: Arc<CardManager>,
        backup: PasswordBackup,
        key_store: Arc<KeyStore>,
    ) -> Self {
        Self {
            identity: identity.into(),
            cards,
            backup,
            key_store,
        }
    }

    /// Identity this lifecycle manages
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// The locally stored key
    pub fn local_key(&self) -> Result<IdentityKeyPair> {
        self.key_store.retrieve(&self.identity)
    }

    /// Whether a key is stored locally
    pub fn has_local_key(&self) -> bool {
        self.key_store.exists(&self.identity)
    }

    /// Register a new identity
    ///
    /// Fails if a local key exists or the identity already has a current
    /// card. With a password the key is backed up once the card is
    /// published.
    pub async fn bootstrap(&self, password: Option<&str>) -> Result<Card> {
        if self.has_local_key() {
            return Err(Error::KeyAlreadyExists(self.identity.clone()));
        }
        if !self.cards.search_cards(&self.identity).await?.is_empty() {
            return Err(Error::KeyAlreadyExists(format!(
                "{} is already registered",
                self.identity
            )));
        }

        let key = KeyPair::generate();
        self.key_store
            .store(&self.identity, &IdentityKeyPair::new(key.clone(), false))?;

        let card = match self.publish(&key, None).await {
            Ok(card) => card,
            Err(e) => {
                if let Err(rollback) = self.key_store.delete(&self.identity) {
                    tracing::warn!(
                        "Failed to roll back unpublished key for {}: {}",
                        self.identity,
                        rollback
                    );
                }
                return Err(e);
            }
        };
        self.key_store.mark_published(&self.identity)?;
        tracing::info!("Bootstrapped {} with card {}", self.identity, card.id);

        if let Some(password) = password {
            self.backup(password).await?;
        }
        Ok(card)
    }

    /// Back up the local key under `password`
    pub async fn backup(&self, password: &str) -> Result<()> {
        let local = self.local_key()?;
        if !local.is_published {
            return Err(Error::IdentityNotPublished(self.identity.clone()));
        }
        self.backup
            .store_private_key(&self.identity, &local.private_key, password)
            .await
    }

    /// Recover the key from backup onto this device
    ///
    /// The restored key counts as published when a current card of the
    /// identity carries its public key.
    pub async fn restore(&self, password: &str) -> Result<IdentityKeyPair> {
        if self.has_local_key() {
            return Err(Error::KeyAlreadyExists(self.identity.clone()));
        }

        let key = self
            .backup
            .retrieve_private_key(&self.identity, password)
            .await?;
        let public_key = key.public_keys();
        let is_published = self
            .cards
            .search_cards(&self.identity)
            .await?
            .heads()
            .any(|card| card.public_key == public_key);
        if !is_published {
            tracing::warn!("Restored key for {} matches no current card", self.identity);
        }

        let identity = IdentityKeyPair::new(key, is_published);
        self.key_store.store(&self.identity, &identity)?;
        tracing::info!("Restored key for {}", self.identity);
        Ok(identity)
    }

    /// Replace the identity's key and card
    ///
    /// The current card must be unique. The local key is replaced, and with a
    /// password so is the backup.
    pub async fn rotate(&self, password: Option<&str>) -> Result<Card> {
        let current = self.cards.search_cards(&self.identity).await?;
        let head = match current.len() {
            0 => return Err(Error::IdentityNotPublished(self.identity.clone())),
            1 => current
                .heads()
                .next()
                .ok_or_else(|| Error::Internal("resolved cards lost their head".into()))?,
            n => {
                return Err(Error::InvalidInput(format!(
                    "{} has {} current cards",
                    self.identity, n
                )))
            }
        };

        let key = KeyPair::generate();
        let card = self.publish(&key, Some(&head.id)).await?;
        self.key_store
            .save(&self.identity, &IdentityKeyPair::new(key.clone(), true))?;
        tracing::info!(
            "Rotated {} from card {} to {}",
            self.identity,
            head.id,
            card.id
        );

        if let Some(password) = password {
            self.backup
                .replace_private_key(&self.identity, &key, password)
                .await?;
        }
        Ok(card)
    }

    /// Re-encrypt the backup under a new password
    pub async fn change_password(&self, old_password: &str, new_password: &str) -> Result<()> {
        self.backup
            .change_password(&self.identity, old_password, new_password)
            .await
    }

    /// Delete the backup
    pub async fn delete_backup(&self, password: &str) -> Result<()> {
        self.backup
            .delete_private_key(&self.identity, password)
            .await
    }

    /// Forget the local key
    pub fn cleanup(&self) -> Result<()> {
        self.key_store.delete(&self.identity)
    }

    async fn publish(&self, key: &KeyPair, previous_card_id: Option<&str>) -> Result<Card> {
        let model = self
            .cards
            .generate_raw_card(key, &self.identity, previous_card_id)?;
        self.cards.publish_card(model).await
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AccessToken, AccessTokenProvider, ConstAccessTokenProvider};
    use crate::brainkey::{BrainKey, LocalPythiaClient, ProofPolicy, SeedService, SeedServiceSecrets};
    use crate::cards::{
        CardClient, CardLookup, CardRegistry, LocalCardClient, RawSignedModel, VirgilCardVerifier,
    };
    use crate::crypto::SigningKeyPair;
    use crate::keyknox::{KeyknoxStore, MemoryKeyknoxClient};
    use crate::oprf::RistrettoOprf;
    use async_trait::async_trait;
    use tokio_test::{assert_err, assert_ok};

    /// Card service that is reachable but refuses every publish
    struct RejectingCards(LocalCardClient);

    #[async_trait]
    impl CardClient for RejectingCards {
        async fn publish_card(
            &self,
            _model: &RawSignedModel,
            _token: &AccessToken,
        ) -> Result<RawSignedModel> {
            Err(Error::TransportError("publish refused".into()))
        }

        async fn get_card(&self, card_id: &str, token: &AccessToken) -> Result<CardLookup> {
            self.0.get_card(card_id, token).await
        }

        async fn search_cards(
            &self,
            identity: &str,
            token: &AccessToken,
        ) -> Result<Vec<RawSignedModel>> {
            self.0.search_cards(identity, token).await
        }
    }

    /// Service-side state shared by every device
    struct Services {
        seeds: Arc<SeedService>,
        cards: Arc<CardRegistry>,
        keyknox: Arc<KeyknoxStore>,
    }

    impl Services {
        fn new() -> Self {
            let seeds = SeedService::new(
                Arc::new(RistrettoOprf::new()),
                &SeedServiceSecrets {
                    key_id: b"brainkey".to_vec(),
                    pythia_secret: b"pythia".to_vec(),
                    scope_secret: b"scope".to_vec(),
                },
            )
            .unwrap();

            Self {
                seeds: Arc::new(seeds),
                cards: Arc::new(CardRegistry::new(SigningKeyPair::generate())),
                keyknox: Arc::new(KeyknoxStore::new()),
            }
        }

        /// A fresh device with its own key store
        fn device(&self, identity: &str) -> KeyLifecycle {
            self.device_with(identity, Arc::new(LocalCardClient::new(self.cards.clone())))
        }

        fn device_with(&self, identity: &str, card_client: Arc<dyn CardClient>) -> KeyLifecycle {
            let tokens: Arc<dyn AccessTokenProvider> =
                Arc::new(ConstAccessTokenProvider::new(AccessToken::new(identity)));

            let brainkey = BrainKey::new(
                Arc::new(RistrettoOprf::new()),
                Arc::new(LocalPythiaClient::new(self.seeds.clone())),
                tokens.clone(),
                ProofPolicy::Verify {
                    transformation_public_key: self.seeds.transformation_public_key().to_vec(),
                },
            );
            let cards = CardManager::new(
                card_client,
                Arc::new(VirgilCardVerifier::new(Some(self.cards.service_public_key()))),
                tokens.clone(),
            );
            let backup = PasswordBackup::new(
                Arc::new(brainkey),
                Arc::new(MemoryKeyknoxClient::new(self.keyknox.clone())),
                tokens,
            );

            KeyLifecycle::new(identity, Arc::new(cards), backup, Arc::new(KeyStore::default()))
        }
    }

    #[tokio::test]
    async fn test_bootstrap_publishes_then_backs_up() {
        let services = Services::new();
        let device = services.device("alice");

        let card = device.bootstrap(Some("hunter2")).await.unwrap();

        let local = device.local_key().unwrap();
        assert!(local.is_published);
        assert_eq!(card.public_key, local.public_key);
        assert_eq!(services.cards.search("alice").len(), 1);
        assert!(!services.keyknox.pull("alice").is_empty());

        // Twice is refused
        assert!(matches!(
            device.bootstrap(None).await,
            Err(Error::KeyAlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_bootstrap_refuses_registered_identity() {
        let services = Services::new();
        services.device("alice").bootstrap(None).await.unwrap();

        let second = services.device("alice");
        assert!(matches!(
            second.bootstrap(None).await,
            Err(Error::KeyAlreadyExists(_))
        ));
        assert!(!second.has_local_key());
    }

    #[tokio::test]
    async fn test_bootstrap_rolls_back_on_publish_failure() {
        let services = Services::new();
        let rejecting = RejectingCards(LocalCardClient::new(services.cards.clone()));
        let device = services.device_with("alice", Arc::new(rejecting));

        assert!(matches!(
            device.bootstrap(None).await,
            Err(Error::TransportError(_))
        ));
        assert!(!device.has_local_key());

        // The rolled back identity can still be registered
        assert_ok!(services.device("alice").bootstrap(None).await);
    }

    #[tokio::test]
    async fn test_backup_requires_published_key() {
        let services = Services::new();
        let device = services.device("alice");
        device
            .key_store
            .store("alice", &IdentityKeyPair::new(KeyPair::generate(), false))
            .unwrap();

        assert!(matches!(
            device.backup("pw").await,
            Err(Error::IdentityNotPublished(_))
        ));
        assert!(services.keyknox.pull("alice").is_empty());
    }

    #[tokio::test]
    async fn test_restore_on_fresh_device() {
        let services = Services::new();
        let laptop = services.device("alice");
        laptop.bootstrap(Some("hunter2")).await.unwrap();
        let original = laptop.local_key().unwrap();

        let phone = services.device("alice");
        let restored = phone.restore("hunter2").await.unwrap();

        assert_eq!(restored.public_key, original.public_key);
        assert_eq!(
            restored.private_key.private_bytes(),
            original.private_key.private_bytes()
        );
        assert!(restored.is_published);

        // Wrong password on another device
        let tablet = services.device("alice");
        assert_err!(tablet.restore("wrong").await);
        assert!(!tablet.has_local_key());
    }

    #[tokio::test]
    async fn test_double_backup_rejected() {
        let services = Services::new();
        let device = services.device("alice");
        device.bootstrap(Some("pw")).await.unwrap();

        assert!(matches!(
            device.backup("pw").await,
            Err(Error::EntryAlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_change_password() {
        let services = Services::new();
        let device = services.device("alice");
        device.bootstrap(Some("old")).await.unwrap();
        let original = device.local_key().unwrap().public_key;

        device.change_password("old", "new").await.unwrap();

        let with_new = services.device("alice");
        assert_eq!(with_new.restore("new").await.unwrap().public_key, original);

        let with_old = services.device("alice");
        assert!(matches!(
            with_old.restore("old").await,
            Err(Error::DecryptionFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_backup() {
        let services = Services::new();
        let device = services.device("alice");
        device.bootstrap(Some("pw")).await.unwrap();

        assert_err!(device.delete_backup("wrong").await);
        assert_ok!(device.delete_backup("pw").await);
        assert!(services.keyknox.pull("alice").is_empty());

        assert!(matches!(
            device.delete_backup("pw").await,
            Err(Error::EntryNotFound(_))
        ));
        assert!(matches!(
            services.device("alice").restore("pw").await,
            Err(Error::EntryNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rotate() {
        let services = Services::new();
        let device = services.device("alice");
        let first = device.bootstrap(Some("pw")).await.unwrap();

        let second = device.rotate(Some("pw")).await.unwrap();
        assert_eq!(second.previous_card_id.as_deref(), Some(first.id.as_str()));
        assert_eq!(device.local_key().unwrap().public_key, second.public_key);

        // Backup follows the rotation
        let phone = services.device("alice");
        let restored = phone.restore("pw").await.unwrap();
        assert_eq!(restored.public_key, second.public_key);
        assert!(restored.is_published);

        // Registry marks the old card superseded
        assert!(services.cards.get(&first.id).unwrap().is_superseded);
    }

    #[tokio::test]
    async fn test_rotate_requires_card() {
        let services = Services::new();
        let device = services.device("alice");
        assert!(matches!(
            device.rotate(None).await,
            Err(Error::IdentityNotPublished(_))
        ));
    }

    #[tokio::test]
    async fn test_cleanup() {
        let services = Services::new();
        let device = services.device("alice");
        device.bootstrap(None).await.unwrap();

        device.cleanup().unwrap();
        assert!(!device.has_local_key());
        assert!(matches!(device.cleanup(), Err(Error::KeyNotFound(_))));
    }
}
