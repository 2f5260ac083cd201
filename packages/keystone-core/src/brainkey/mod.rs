//! # BrainKey
//!
//! Deterministic key pairs from low-entropy passwords. The password is
//! hardened by a remote transformation service through an OPRF, so an
//! attacker holding a derived public key cannot brute-force the password
//! offline.
//!
//! ## Pipeline
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     generate_key_pair(password, id)                     │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌──────────────────┐     ┌──────────────────┐                          │
//! │  │ 1. access token  │     │ 2. blind(pw)     │   run concurrently       │
//! │  └────────┬─────────┘     └────────┬─────────┘                          │
//! │           └───────────┬────────────┘                                    │
//! │                       ▼                                                 │
//! │  ┌──────────────────────────────────────────┐                           │
//! │  │ 3. seed = service(blinded, id, proof?)   │                           │
//! │  │    verify proof (ProofPolicy::Verify)    │                           │
//! │  └──────────────────┬───────────────────────┘                           │
//! │                     ▼                                                   │
//! │  ┌──────────────────────────────────────────┐                           │
//! │  │ 4. deblind(seed) → HKDF(salt = id)       │                           │
//! │  │    → KeyPair::from_seed                  │                           │
//! │  └──────────────────────────────────────────┘                           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The first failing stage ends the derivation. Nothing is retried here.

mod client;
mod service;

pub use client::{HttpPythiaClient, LocalPythiaClient, PythiaClient, SEED_PATH};
pub use service::{SeedRequest, SeedResponse, SeedService, SeedServiceSecrets};

use std::sync::Arc;

use crate::auth::{AccessTokenProvider, TokenContext};
use crate::config::ServiceConfig;
use crate::crypto::{derive_brainkey_seed, KeyPair};
use crate::error::{Error, Result};
use crate::oprf::Oprf;

/// BrainKey id used when the caller gives none
///
/// Only reachable through `None`; an explicit empty id is rejected.
pub const DEFAULT_BRAINKEY_ID: &str = "";

const TOKEN_CONTEXT: TokenContext = TokenContext::new("pythia", "seed");

/// How transform responses are trusted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProofPolicy {
    /// Require a proof and check it against the pinned public key
    Verify {
        /// Transformation public key of the service
        transformation_public_key: Vec<u8>,
    },
    /// Trust the authenticated channel and skip proofs
    TrustChannel,
}

impl ProofPolicy {
    /// `Verify` when the configuration pins a key, `TrustChannel` otherwise
    pub fn from_config(config: &ServiceConfig) -> Self {
        match config.brainkey_public_key {
            Some(key) => ProofPolicy::Verify {
                transformation_public_key: key.to_vec(),
            },
            None => ProofPolicy::TrustChannel,
        }
    }
}

/// Derives key pairs from passwords
pub struct BrainKey {
    oprf: Arc<dyn Oprf>,
    client: Arc<dyn PythiaClient>,
    tokens: Arc<dyn AccessTokenProvider>,
    policy: ProofPolicy,
}

impl BrainKey {
    /// Assemble a BrainKey from its collaborators
    pub fn new(
        oprf: Arc<dyn Oprf>,
        client: Arc<dyn PythiaClient>,
        tokens: Arc<dyn AccessTokenProvider>,
        policy: ProofPolicy,
    ) -> Self {
        if policy == ProofPolicy::TrustChannel {
            tracing::warn!("BrainKey proofs disabled; trusting the transformation channel");
        }

        Self {
            oprf,
            client,
            tokens,
            policy,
        }
    }

    /// Active proof policy
    pub fn policy(&self) -> &ProofPolicy {
        &self.policy
    }

    /// Derive the key pair for `password` under `brainkey_id`
    ///
    /// The same password and id always produce the same key pair as long as
    /// the service keeps its secrets. `None` selects the default id;
    /// `Some("")` is `InvalidInput`.
    pub async fn generate_key_pair(
        &self,
        password: &str,
        brainkey_id: Option<&str>,
    ) -> Result<KeyPair> {
        if password.is_empty() {
            return Err(Error::EmptyPassword);
        }
        let brainkey_id = match brainkey_id {
            Some("") => {
                return Err(Error::InvalidInput(
                    "brainkey id must not be empty; pass None for the default".into(),
                ))
            }
            Some(id) => id,
            None => DEFAULT_BRAINKEY_ID,
        };

        // Stages 1 and 2
        let (token, blinded) = tokio::try_join!(self.tokens.get_token(TOKEN_CONTEXT), async {
            self.oprf.blind(password.as_bytes())
        })?;
        tracing::debug!("BrainKey: password blinded, token acquired");

        // Stage 3
        let verify_key = match &self.policy {
            ProofPolicy::Verify {
                transformation_public_key,
            } => Some(transformation_public_key.as_slice()),
            ProofPolicy::TrustChannel => None,
        };

        let request = SeedRequest {
            blinded_password: blinded.blinded_password.clone(),
            brainkey_id: (!brainkey_id.is_empty()).then(|| brainkey_id.to_string()),
            include_proof: verify_key.is_some(),
        };
        let response = self.client.generate_seed(&request, &token).await?;
        tracing::debug!("BrainKey: seed received");

        if let Some(public_key) = verify_key {
            let proof = response.proof.as_ref().ok_or(Error::ProofMissing)?;
            let valid = self.oprf.verify(
                &response.seed,
                &blinded.blinded_password,
                brainkey_id.as_bytes(),
                public_key,
                proof,
            )?;
            if !valid {
                tracing::warn!("BrainKey: transformation proof rejected");
                return Err(Error::ProofVerificationFailed);
            }
        }

        // Stage 4
        let deblinded = self.oprf.deblind(&response.seed, &blinded.blinding_secret)?;
        let seed = derive_brainkey_seed(&deblinded, brainkey_id)?;
        let key_pair = KeyPair::from_seed(&seed)?;

        tracing::debug!(
            "BrainKey: derived key {}",
            hex::encode(key_pair.key_identifier())
        );
        Ok(key_pair)
    }
}

// ============================================================================
// TESTS
// ============================================================================
