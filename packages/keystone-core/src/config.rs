//! Service endpoint configuration.
//!
//! Endpoints and pinned public keys for the card service, Keyknox and the
//! Pythia transformation service, loaded from `KEYSTONE_*` environment
//! variables.

use std::env;

use crate::crypto::PublicKey;
use crate::error::{Error, Result};

/// Default base URL, shared by all three services unless overridden.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Default `Authorization` scheme.
pub const DEFAULT_AUTH_SCHEME: &str = "Virgil";

/// Endpoints and pinned keys for the remote services.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Card service base URL (`/card/v5` is appended).
    pub card_service_url: String,
    /// Keyknox base URL (`/keyknox/v1` is appended).
    pub keyknox_url: String,
    /// Pythia base URL (`/pythia/v1/brainkey` is appended).
    pub pythia_url: String,
    /// Ed25519 key the card service signs with. Required for the default
    /// card verifier.
    pub service_public_key: Option<[u8; 32]>,
    /// Transformation public key of the Pythia service. When present,
    /// BrainKey demands and verifies a proof for every seed.
    pub brainkey_public_key: Option<[u8; 32]>,
    /// Scheme used in the `Authorization` header.
    pub auth_scheme: String,
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    ///
    /// Fails if a pinned key is set but cannot be decoded, so a typo never
    /// turns proof or signature checks off.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup("KEYSTONE_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = base_url.trim_end_matches('/').to_string();

        let pinned = |name: &str| -> Result<Option<[u8; 32]>> {
            match lookup(name) {
                Some(value) if !value.trim().is_empty() => parse_key(name, &value).map(Some),
                _ => Ok(None),
            }
        };

        Ok(Self {
            card_service_url: lookup("KEYSTONE_CARD_SERVICE_URL").unwrap_or_else(|| base_url.clone()),
            keyknox_url: lookup("KEYSTONE_KEYKNOX_URL").unwrap_or_else(|| base_url.clone()),
            pythia_url: lookup("KEYSTONE_PYTHIA_URL").unwrap_or_else(|| base_url.clone()),
            service_public_key: pinned("KEYSTONE_SERVICE_PUBLIC_KEY")?,
            brainkey_public_key: pinned("KEYSTONE_BRAINKEY_PUBLIC_KEY")?,
            auth_scheme: lookup("KEYSTONE_AUTH_SCHEME")
                .unwrap_or_else(|| DEFAULT_AUTH_SCHEME.to_string()),
        })
    }

    /// Point all three services at one base URL.
    pub fn with_base_url(base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            card_service_url: base_url.clone(),
            keyknox_url: base_url.clone(),
            pythia_url: base_url,
            service_public_key: None,
            brainkey_public_key: None,
            auth_scheme: DEFAULT_AUTH_SCHEME.to_string(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }
}

/// A 32-byte hex key, or a 64-byte card key of which the signing half is pinned.
fn parse_key(name: &str, value: &str) -> Result<[u8; 32]> {
    let value = value.trim();
    if let Ok(bytes) = hex::decode(value) {
        if let Ok(key) = <[u8; 32]>::try_from(bytes.as_slice()) {
            return Ok(key);
        }
    }
    if let Ok(public) = PublicKey::from_hex(value) {
        return Ok(public.signing);
    }
    Err(Error::InvalidConfig(format!(
        "{} is not a 32-byte hex key",
        name
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.card_service_url, DEFAULT_BASE_URL);
        assert_eq!(config.keyknox_url, DEFAULT_BASE_URL);
        assert_eq!(config.auth_scheme, DEFAULT_AUTH_SCHEME);
        assert!(config.brainkey_public_key.is_none());
    }

    #[test]
    fn test_overrides_and_keys() {
        let key = hex::encode([7u8; 32]);
        let card_public = crate::crypto::KeyPair::generate().public_keys();
        let card_key = card_public.to_hex();
        let config = ServiceConfig::from_lookup(lookup_from(&[
            ("KEYSTONE_BASE_URL", "https://keys.example/"),
            ("KEYSTONE_KEYKNOX_URL", "https://knox.example"),
            ("KEYSTONE_BRAINKEY_PUBLIC_KEY", key.as_str()),
            ("KEYSTONE_SERVICE_PUBLIC_KEY", card_key.as_str()),
        ]))
        .unwrap();

        assert_eq!(config.card_service_url, "https://keys.example");
        assert_eq!(config.keyknox_url, "https://knox.example");
        assert_eq!(config.brainkey_public_key, Some([7u8; 32]));
        assert_eq!(config.service_public_key, Some(card_public.signing));
    }

    #[test]
    fn test_malformed_pinned_key_is_error() {
        let err = ServiceConfig::from_lookup(lookup_from(&[(
            "KEYSTONE_BRAINKEY_PUBLIC_KEY",
            "not-hex",
        )]))
        .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));

        // Right encoding, wrong length
        let short = hex::encode([1u8; 31]);
        let err = ServiceConfig::from_lookup(lookup_from(&[(
            "KEYSTONE_SERVICE_PUBLIC_KEY",
            short.as_str(),
        )]))
        .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_blank_pinned_key_is_unset() {
        let config = ServiceConfig::from_lookup(lookup_from(&[(
            "KEYSTONE_BRAINKEY_PUBLIC_KEY",
            "  ",
        )]))
        .unwrap();
        assert!(config.brainkey_public_key.is_none());
    }
}
