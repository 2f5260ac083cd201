//! Transport for the Keyknox service.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::store::KeyknoxStore;
use super::{EncryptedKeyknoxValue, KeyknoxVersion};
use crate::auth::AccessToken;
use crate::config::ServiceConfig;
use crate::encoding::{base64_bytes, from_base64, to_base64};
use crate::error::{Error, Result};
use crate::http;

/// Base path of the Keyknox service
pub const KEYKNOX_PATH: &str = "/keyknox/v1";

/// Request header naming the hash of the value being replaced
pub const PREVIOUS_HASH_HEADER: &str = "Virgil-Keyknox-Previous-Hash";

/// Response header carrying the hash of the stored value
pub const HASH_HEADER: &str = "Virgil-Keyknox-Hash";

/// `PUT /keyknox/v1` body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyknoxPushRequest {
    /// Envelope header
    #[serde(with = "base64_bytes")]
    pub meta: Vec<u8>,
    /// Ciphertext
    #[serde(with = "base64_bytes")]
    pub value: Vec<u8>,
}

/// Body returned by every Keyknox endpoint
///
/// The hash travels in [`HASH_HEADER`], not in the body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyknoxResponse {
    /// Envelope header
    #[serde(with = "base64_bytes")]
    pub meta: Vec<u8>,
    /// Ciphertext
    #[serde(with = "base64_bytes")]
    pub value: Vec<u8>,
    /// Current version
    pub version: KeyknoxVersion,
}

impl KeyknoxResponse {
    /// Split a stored value into body and hash
    pub fn from_value(value: EncryptedKeyknoxValue) -> (Self, Vec<u8>) {
        (
            Self {
                meta: value.meta,
                value: value.value,
                version: value.version,
            },
            value.keyknox_hash,
        )
    }

    fn into_value(self, keyknox_hash: Vec<u8>) -> EncryptedKeyknoxValue {
        EncryptedKeyknoxValue {
            meta: self.meta,
            value: self.value,
            version: self.version,
            keyknox_hash,
        }
    }
}

/// Talks to a Keyknox service
#[async_trait]
pub trait KeyknoxClient: Send + Sync {
    /// Replace the stored value if `previous_hash` is still current
    async fn push_value(
        &self,
        meta: &[u8],
        value: &[u8],
        previous_hash: Option<&[u8]>,
        token: &AccessToken,
    ) -> Result<EncryptedKeyknoxValue>;

    /// Fetch the stored value
    async fn pull_value(&self, token: &AccessToken) -> Result<EncryptedKeyknoxValue>;

    /// Erase the stored value
    async fn reset_value(&self, token: &AccessToken) -> Result<EncryptedKeyknoxValue>;
}

/// Keyknox client over HTTP
#[derive(Debug, Clone)]
pub struct HttpKeyknoxClient {
    http: reqwest::Client,
    base_url: String,
    auth_scheme: String,
}

impl HttpKeyknoxClient {
    /// Client for a service base URL
    pub fn new(base_url: impl Into<String>, auth_scheme: impl Into<String>) -> Self {
        Self {
            http: http::build_client(),
            base_url: base_url.into(),
            auth_scheme: auth_scheme.into(),
        }
    }

    /// Client for the configured Keyknox endpoint
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(config.keyknox_url.clone(), config.auth_scheme.clone())
    }

    fn authorization(&self, token: &AccessToken) -> String {
        format!("{} {}", self.auth_scheme, token.value)
    }

    async fn read_value(response: reqwest::Response) -> Result<EncryptedKeyknoxValue> {
        if response.status() == StatusCode::CONFLICT {
            return Err(Error::KeyknoxConflict);
        }
        let response = http::check_status(response).await?;

        let hash = response
            .headers()
            .get(HASH_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(Error::InvalidPreviousHashHeader)?;
        let hash = from_base64(hash).map_err(|_| Error::InvalidPreviousHashHeader)?;

        let body: KeyknoxResponse = response.json().await?;
        Ok(body.into_value(hash))
    }
}

#[async_trait]
impl KeyknoxClient for HttpKeyknoxClient {
    async fn push_value(
        &self,
        meta: &[u8],
        value: &[u8],
        previous_hash: Option<&[u8]>,
        token: &AccessToken,
    ) -> Result<EncryptedKeyknoxValue> {
        let mut request = self
            .http
            .put(http::join(&self.base_url, KEYKNOX_PATH))
            .header(reqwest::header::AUTHORIZATION, self.authorization(token))
            .json(&KeyknoxPushRequest {
                meta: meta.to_vec(),
                value: value.to_vec(),
            });
        if let Some(hash) = previous_hash {
            request = request.header(PREVIOUS_HASH_HEADER, to_base64(hash));
        }

        Self::read_value(request.send().await?).await
    }

    async fn pull_value(&self, token: &AccessToken) -> Result<EncryptedKeyknoxValue> {
        let response = self
            .http
            .get(http::join(&self.base_url, KEYKNOX_PATH))
            .header(reqwest::header::AUTHORIZATION, self.authorization(token))
            .send()
            .await?;

        Self::read_value(response).await
    }

    async fn reset_value(&self, token: &AccessToken) -> Result<EncryptedKeyknoxValue> {
        let response = self
            .http
            .post(http::join(
                &self.base_url,
                &format!("{}/reset", KEYKNOX_PATH),
            ))
            .header(reqwest::header::AUTHORIZATION, self.authorization(token))
            .send()
            .await?;

        Self::read_value(response).await
    }
}

/// Keyknox client backed by a [`KeyknoxStore`] in process
///
/// The token value is taken as the owner.
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyknoxClient {
    store: Arc<KeyknoxStore>,
}

impl MemoryKeyknoxClient {
    /// Client over a shared store
    pub fn new(store: Arc<KeyknoxStore>) -> Self {
        Self { store }
    }

    /// The underlying store
    pub fn store(&self) -> &Arc<KeyknoxStore> {
        &self.store
    }
}

#[async_trait]
impl KeyknoxClient for MemoryKeyknoxClient {
    async fn push_value(
        &self,
        meta: &[u8],
        value: &[u8],
        previous_hash: Option<&[u8]>,
        token: &AccessToken,
    ) -> Result<EncryptedKeyknoxValue> {
        self.store
            .push(&token.value, meta.to_vec(), value.to_vec(), previous_hash)
    }

    async fn pull_value(&self, token: &AccessToken) -> Result<EncryptedKeyknoxValue> {
        Ok(self.store.pull(&token.value))
    }

    async fn reset_value(&self, token: &AccessToken) -> Result<EncryptedKeyknoxValue> {
        Ok(self.store.reset(&token.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_wire_format() {
        let body = KeyknoxResponse {
            meta: vec![1, 2],
            value: vec![3],
            version: KeyknoxVersion::INITIAL.next_minor(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["meta"], "AQI=");
        assert_eq!(json["value"], "Aw==");
        assert_eq!(json["version"], "1.1");
    }

    #[tokio::test]
    async fn test_memory_client_scopes_by_token() {
        let client = MemoryKeyknoxClient::default();
        let alice = AccessToken::new("alice");
        let bob = AccessToken::new("bob");

        let pushed = client.push_value(b"m", b"v", None, &alice).await.unwrap();
        assert_eq!(client.pull_value(&alice).await.unwrap(), pushed);
        assert!(client.pull_value(&bob).await.unwrap().is_empty());

        let err = client.push_value(b"m", b"w", None, &alice).await.unwrap_err();
        assert!(matches!(err, Error::KeyknoxConflict));

        let reset = client.reset_value(&alice).await.unwrap();
        assert_eq!(reset.version.to_string(), "2.0");
    }
}
