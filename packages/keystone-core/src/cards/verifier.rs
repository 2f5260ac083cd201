//! Card verification policy.
//!
//! ```text
//! verify_card = self signature        (if enabled)
//!           AND service signature     (if enabled, pinned key)
//!           AND every whitelist       (at least one listed signer verifies)
//! ```
//!
//! Every failure, including malformed keys or signatures, is reported as
//! `false`. The caller decides how to surface an untrusted card.

use std::collections::HashSet;

use super::model::Card;
use super::signer::{SELF_SIGNER, VIRGIL_SIGNER};
use crate::config::ServiceConfig;
use crate::crypto::verify_slice;
use crate::error::{Error, Result};

/// Decides whether a card can be trusted
pub trait CardVerifier: Send + Sync {
    /// `true` only if every configured check passes
    fn verify_card(&self, card: &Card) -> bool;
}

/// A signer and the Ed25519 key its signatures verify under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierCredentials {
    /// Signer id as it appears on cards
    pub signer: String,
    /// Ed25519 public key
    pub public_key: [u8; 32],
}

impl VerifierCredentials {
    /// Credentials for one signer
    pub fn new(signer: impl Into<String>, public_key: [u8; 32]) -> Self {
        Self {
            signer: signer.into(),
            public_key,
        }
    }
}

/// Signers of which at least one must have signed a card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Whitelist {
    credentials: Vec<VerifierCredentials>,
}

impl Whitelist {
    /// Build a whitelist; repeated signers are rejected
    pub fn new(credentials: Vec<VerifierCredentials>) -> Result<Self> {
        let mut seen = HashSet::new();
        for cred in &credentials {
            if cred.signer.is_empty() {
                return Err(Error::EmptySigner);
            }
            if !seen.insert(cred.signer.as_str()) {
                return Err(Error::DuplicateSigner(cred.signer.clone()));
            }
        }
        Ok(Self { credentials })
    }

    /// Listed credentials, in order
    pub fn credentials(&self) -> &[VerifierCredentials] {
        &self.credentials
    }
}

/// Default verifier: self signature, service signature and whitelists
#[derive(Debug, Clone)]
pub struct VirgilCardVerifier {
    verify_self_signature: bool,
    verify_virgil_signature: bool,
    service_public_key: Option<[u8; 32]>,
    whitelists: Vec<Whitelist>,
}

impl VirgilCardVerifier {
    /// Verifier pinned to the card service key
    ///
    /// Both self and service checks start enabled.
    pub fn new(service_public_key: Option<[u8; 32]>) -> Self {
        Self {
            verify_self_signature: true,
            verify_virgil_signature: true,
            service_public_key,
            whitelists: Vec::new(),
        }
    }

    /// Verifier pinned to the configured service key
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(config.service_public_key)
    }

    /// Toggle the self-signature check
    pub fn with_self_signature(mut self, enabled: bool) -> Self {
        self.verify_self_signature = enabled;
        self
    }

    /// Toggle the service-signature check
    pub fn with_virgil_signature(mut self, enabled: bool) -> Self {
        self.verify_virgil_signature = enabled;
        self
    }

    /// Replace the whitelists
    pub fn with_whitelists(mut self, whitelists: Vec<Whitelist>) -> Self {
        self.whitelists = whitelists;
        self
    }

    fn verify_self(&self, card: &Card) -> bool {
        verify_signer(card, SELF_SIGNER, &card.public_key.signing)
    }

    fn verify_virgil(&self, card: &Card) -> bool {
        match &self.service_public_key {
            Some(key) => verify_signer(card, VIRGIL_SIGNER, key),
            None => {
                tracing::warn!("No card service key pinned; rejecting card {}", card.id);
                false
            }
        }
    }

    fn verify_whitelist(card: &Card, whitelist: &Whitelist) -> bool {
        whitelist
            .credentials
            .iter()
            .any(|cred| verify_signer(card, &cred.signer, &cred.public_key))
    }
}

impl CardVerifier for VirgilCardVerifier {
    fn verify_card(&self, card: &Card) -> bool {
        if self.verify_self_signature && !self.verify_self(card) {
            tracing::debug!("Card {} failed self-signature check", card.id);
            return false;
        }

        if self.verify_virgil_signature && !self.verify_virgil(card) {
            tracing::debug!("Card {} failed service-signature check", card.id);
            return false;
        }

        for (i, whitelist) in self.whitelists.iter().enumerate() {
            if !Self::verify_whitelist(card, whitelist) {
                tracing::debug!("Card {} failed whitelist {}", card.id, i);
                return false;
            }
        }

        true
    }
}

/// Accepts every card
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAllVerifier;

impl CardVerifier for AcceptAllVerifier {
    fn verify_card(&self, _card: &Card) -> bool {
        true
    }
}

fn verify_signer(card: &Card, signer: &str, public_key: &[u8; 32]) -> bool {
    match card.signature_by(signer) {
        Some(signature) => verify_slice(
            public_key,
            &signature.signed_data(&card.content_snapshot),
            &signature.signature,
        )
        .is_ok(),
        None => false,
    }
}
