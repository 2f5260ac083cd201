//! Server half of the BrainKey seed exchange.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::encoding::base64_bytes;
use crate::error::{Error, Result};
use crate::oprf::{Oprf, ProofOfCorrectTransform, TransformationKeyPair};

/// `POST /pythia/v1/brainkey` request body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedRequest {
    /// Blinded password
    #[serde(with = "base64_bytes")]
    pub blinded_password: Vec<u8>,
    /// Optional BrainKey id, used as the transform tweak
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brainkey_id: Option<String>,
    /// Ask the service to prove the transform
    #[serde(default)]
    pub include_proof: bool,
}

/// `POST /pythia/v1/brainkey` response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedResponse {
    /// Transformed password
    #[serde(with = "base64_bytes")]
    pub seed: Vec<u8>,
    /// Proof of correct transform, when requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<ProofOfCorrectTransform>,
}

/// Transformation secrets of a Pythia deployment
#[derive(Clone)]
pub struct SeedServiceSecrets {
    /// Identifier of the transformation key
    pub key_id: Vec<u8>,
    /// Deployment secret
    pub pythia_secret: Vec<u8>,
    /// Scope secret
    pub scope_secret: Vec<u8>,
}

/// Transforms blinded passwords under a deployment's key
pub struct SeedService {
    oprf: Arc<dyn Oprf>,
    key_pair: TransformationKeyPair,
}

impl SeedService {
    /// Derive the transformation key pair and build the service
    pub fn new(oprf: Arc<dyn Oprf>, secrets: &SeedServiceSecrets) -> Result<Self> {
        if secrets.pythia_secret.is_empty() {
            return Err(Error::InvalidInput("pythia secret must not be empty".into()));
        }

        let key_pair = oprf.compute_transformation_key_pair(
            &secrets.key_id,
            &secrets.pythia_secret,
            &secrets.scope_secret,
        )?;

        tracing::info!(
            "Seed service ready (transformation key {})",
            hex::encode(&key_pair.public_key)
        );

        Ok(Self { oprf, key_pair })
    }

    /// Public key clients pin to verify proofs
    pub fn transformation_public_key(&self) -> &[u8] {
        &self.key_pair.public_key
    }

    /// Transform a blinded password, optionally with a proof
    pub fn generate_seed(&self, request: &SeedRequest) -> Result<SeedResponse> {
        let tweak = request.brainkey_id.as_deref().unwrap_or("");

        let transformed = self.oprf.transform(
            &request.blinded_password,
            tweak.as_bytes(),
            &self.key_pair.private_key,
        )?;

        let proof = if request.include_proof {
            Some(self.oprf.prove(
                &transformed.transformed_password,
                &request.blinded_password,
                &transformed.transformed_tweak,
                &self.key_pair,
            )?)
        } else {
            None
        };

        Ok(SeedResponse {
            seed: transformed.transformed_password,
            proof,
        })
    }
}

impl std::fmt::Debug for SeedService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedService")
            .field("key_pair", &self.key_pair)
            .finish_non_exhaustive()
    }
}
