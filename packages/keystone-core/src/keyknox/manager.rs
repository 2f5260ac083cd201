//! Signs, encrypts and syncs one Keyknox value.

use std::sync::Arc;

use super::client::KeyknoxClient;
use super::crypto::KeyknoxCrypto;
use super::DecryptedKeyknoxValue;
use crate::auth::{AccessTokenProvider, TokenContext};
use crate::crypto::{KeyPair, PublicKey};
use crate::error::{Error, Result};

const PUSH: TokenContext = TokenContext::new("keyknox", "put");
const PULL: TokenContext = TokenContext::new("keyknox", "get");
const RESET: TokenContext = TokenContext::new("keyknox", "reset");

/// Combines the envelope codec with a Keyknox client
///
/// Values are signed with `private_key` and encrypted for every key in
/// `public_keys`. On pull the signer must be one of `public_keys`.
pub struct KeyknoxManager {
    client: Arc<dyn KeyknoxClient>,
    tokens: Arc<dyn AccessTokenProvider>,
    crypto: KeyknoxCrypto,
    private_key: KeyPair,
    public_keys: Vec<PublicKey>,
}

impl KeyknoxManager {
    /// Manager for one key pair and its recipients
    pub fn new(
        client: Arc<dyn KeyknoxClient>,
        tokens: Arc<dyn AccessTokenProvider>,
        private_key: KeyPair,
        public_keys: Vec<PublicKey>,
    ) -> Result<Self> {
        if public_keys.is_empty() {
            return Err(Error::EmptyPublicKeysList);
        }

        Ok(Self {
            client,
            tokens,
            crypto: KeyknoxCrypto::new(),
            private_key,
            public_keys,
        })
    }

    /// Manager whose only recipient is its own key
    pub fn for_self(
        client: Arc<dyn KeyknoxClient>,
        tokens: Arc<dyn AccessTokenProvider>,
        private_key: KeyPair,
    ) -> Self {
        let public_keys = vec![private_key.public_keys()];
        Self {
            client,
            tokens,
            crypto: KeyknoxCrypto::new(),
            private_key,
            public_keys,
        }
    }

    /// Current recipients
    pub fn public_keys(&self) -> &[PublicKey] {
        &self.public_keys
    }

    /// Encrypt `data` and replace the stored value
    pub async fn push_value(
        &self,
        data: &[u8],
        previous_hash: Option<&[u8]>,
    ) -> Result<DecryptedKeyknoxValue> {
        let (meta, value) = self
            .crypto
            .encrypt(data, &self.private_key, &self.public_keys)?;

        let token = self.tokens.get_token(PUSH).await?;
        let stored = self
            .client
            .push_value(&meta, &value, previous_hash, &token)
            .await?;

        tracing::debug!("Pushed keyknox value, now at {}", stored.version);
        self.crypto
            .decrypt(&stored, &self.private_key, &self.public_keys)
    }

    /// Fetch, decrypt and verify the stored value
    pub async fn pull_value(&self) -> Result<DecryptedKeyknoxValue> {
        let token = self.tokens.get_token(PULL).await?;
        let stored = self.client.pull_value(&token).await?;

        tracing::debug!("Pulled keyknox value at {}", stored.version);
        self.crypto
            .decrypt(&stored, &self.private_key, &self.public_keys)
    }

    /// Erase the stored value
    pub async fn reset_value(&self) -> Result<DecryptedKeyknoxValue> {
        let token = self.tokens.get_token(RESET).await?;
        let stored = self.client.reset_value(&token).await?;

        tracing::info!("Reset keyknox value to {}", stored.version);
        self.crypto
            .decrypt(&stored, &self.private_key, &self.public_keys)
    }

    /// Re-encrypt the stored value for new recipients
    ///
    /// The value is pulled with the current keys, then pushed signed by
    /// `new_private_key` (or the current key) for `new_public_keys`. An empty
    /// value is not pushed. The manager switches to the new keys only after
    /// the push succeeded.
    pub async fn update_recipients(
        &mut self,
        new_public_keys: Vec<PublicKey>,
        new_private_key: Option<KeyPair>,
    ) -> Result<DecryptedKeyknoxValue> {
        if new_public_keys.is_empty() {
            return Err(Error::EmptyPublicKeysList);
        }

        let current = self.pull_value().await?;
        let private_key = new_private_key.unwrap_or_else(|| self.private_key.clone());

        let result = if current.is_empty() {
            current
        } else {
            let (meta, value) = self
                .crypto
                .encrypt(&current.value, &private_key, &new_public_keys)?;
            let token = self.tokens.get_token(PUSH).await?;
            let stored = self
                .client
                .push_value(&meta, &value, Some(&current.keyknox_hash), &token)
                .await?;
            self.crypto
                .decrypt(&stored, &private_key, &new_public_keys)?
        };

        tracing::info!(
            "Keyknox recipients updated ({} keys)",
            new_public_keys.len()
        );
        self.private_key = private_key;
        self.public_keys = new_public_keys;
        Ok(result)
    }
}

// ============================================================================
// TESTS
// ============================================================================
