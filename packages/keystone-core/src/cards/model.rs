//! Card data model and its signed wire form.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::crypto::{sha512, PublicKey};
use crate::encoding::{base64_bytes, base64_opt};
use crate::error::{Error, Result};

/// Current card format version
pub const CARD_VERSION: &str = "5.0";

/// Signed card as exchanged with the card service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSignedModel {
    /// Exact bytes every signature covers
    #[serde(with = "base64_bytes")]
    pub content_snapshot: Vec<u8>,
    /// Signatures in the order they were added
    #[serde(default)]
    pub signatures: Vec<CardSignature>,
}

impl RawSignedModel {
    /// Unsigned model for a snapshot
    pub fn new(content_snapshot: Vec<u8>) -> Self {
        Self {
            content_snapshot,
            signatures: Vec::new(),
        }
    }

    /// Signature by `signer`, if present
    pub fn signature_by(&self, signer: &str) -> Option<&CardSignature> {
        self.signatures.iter().find(|s| s.signer == signer)
    }

    /// Decode the snapshot
    pub fn content(&self) -> Result<RawCardContent> {
        serde_json::from_slice(&self.content_snapshot)
            .map_err(|e| Error::DeserializationError(format!("Invalid card snapshot: {}", e)))
    }
}

/// One signature on a card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardSignature {
    /// Who signed: `"self"`, `"virgil"` or an application signer id
    pub signer: String,
    /// Ed25519 signature over `content_snapshot ‖ snapshot`
    #[serde(with = "base64_bytes")]
    pub signature: Vec<u8>,
    /// Extra signed data
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "base64_opt"
    )]
    pub snapshot: Option<Vec<u8>>,
}

impl CardSignature {
    /// Bytes this signature covers for a given card snapshot
    pub fn signed_data(&self, content_snapshot: &[u8]) -> Vec<u8> {
        let extra = self.snapshot.as_deref().unwrap_or_default();
        let mut data = Vec::with_capacity(content_snapshot.len() + extra.len());
        data.extend_from_slice(content_snapshot);
        data.extend_from_slice(extra);
        data
    }
}

/// Decoded content snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCardContent {
    /// Identity the card belongs to
    pub identity: String,
    /// 64-byte public key
    #[serde(with = "base64_bytes")]
    pub public_key: Vec<u8>,
    /// Card this one replaces
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_card_id: Option<String>,
    /// Card format version
    pub version: String,
    /// Unix timestamp of creation
    pub created_at: i64,
}

impl RawCardContent {
    /// Serialize into the bytes that get signed
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Card id for a snapshot: hex of the first 32 bytes of its SHA-512
pub fn card_id(content_snapshot: &[u8]) -> String {
    hex::encode(&sha512(content_snapshot)[..32])
}

/// A parsed identity card
///
/// Built only from a [`RawSignedModel`], so `id` always matches the
/// snapshot. Only `is_outdated` changes after construction, during chain
/// resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    /// Content hash of the snapshot
    pub id: String,
    /// Owner identity
    pub identity: String,
    /// Owner public key
    pub public_key: PublicKey,
    /// Card this one replaces
    pub previous_card_id: Option<String>,
    /// Whether a newer card replaced this one
    pub is_outdated: bool,
    /// Card format version
    pub version: String,
    /// Unix timestamp of creation
    pub created_at: i64,
    /// Signatures in wire order
    pub signatures: Vec<CardSignature>,
    /// Bytes every signature covers
    pub content_snapshot: Vec<u8>,
}

impl Card {
    /// Parse a signed model
    ///
    /// Fails on an undecodable snapshot, a malformed public key or a repeated
    /// signer. Signatures are not checked here.
    pub fn parse(model: &RawSignedModel) -> Result<Self> {
        let content = model.content()?;

        let mut seen = HashSet::new();
        for signature in &model.signatures {
            if signature.signer.is_empty() {
                return Err(Error::EmptySigner);
            }
            if !seen.insert(signature.signer.as_str()) {
                return Err(Error::DuplicateSigner(signature.signer.clone()));
            }
        }

        Ok(Self {
            id: card_id(&model.content_snapshot),
            identity: content.identity,
            public_key: PublicKey::from_slice(&content.public_key)?,
            previous_card_id: content.previous_card_id,
            is_outdated: false,
            version: content.version,
            created_at: content.created_at,
            signatures: model.signatures.clone(),
            content_snapshot: model.content_snapshot.clone(),
        })
    }

    /// Signed model for this card, byte-identical to the one it came from
    pub fn raw_card(&self) -> RawSignedModel {
        RawSignedModel {
            content_snapshot: self.content_snapshot.clone(),
            signatures: self.signatures.clone(),
        }
    }

    /// Signature by `signer`, if present
    pub fn signature_by(&self, signer: &str) -> Option<&CardSignature> {
        self.signatures.iter().find(|s| s.signer == signer)
    }
}
