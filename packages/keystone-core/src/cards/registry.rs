//! Server half of the card service.

use std::collections::HashMap;

use parking_lot::RwLock;

use super::model::{Card, RawSignedModel};
use super::signer::{ModelSigner, SELF_SIGNER, VIRGIL_SIGNER};
use super::verifier::{CardVerifier, VirgilCardVerifier};
use crate::crypto::SigningKeyPair;
use crate::error::{Error, Result};

/// A stored card and whether a newer card replaced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardLookup {
    /// Signed model including the service signature
    pub model: RawSignedModel,
    /// Set once another card names this one as its predecessor
    pub is_superseded: bool,
}

#[derive(Debug, Clone)]
struct StoredCard {
    identity: String,
    created_at: i64,
    model: RawSignedModel,
    superseded: bool,
}

/// Accepts, countersigns and serves cards
pub struct CardRegistry {
    service_key: SigningKeyPair,
    cards: RwLock<HashMap<String, StoredCard>>,
}

impl CardRegistry {
    /// Registry that countersigns with `service_key`
    pub fn new(service_key: SigningKeyPair) -> Self {
        Self {
            service_key,
            cards: RwLock::new(HashMap::new()),
        }
    }

    /// Ed25519 key clients pin for the `"virgil"` signature
    pub fn service_public_key(&self) -> [u8; 32] {
        self.service_key.public_bytes()
    }

    /// Publish a self-signed model on behalf of `caller`
    ///
    /// The card must belong to `caller`, carry a valid self signature and
    /// not be signed by the service yet. A predecessor, when named, must be a
    /// current card of the same identity; it is marked superseded.
    pub fn publish(&self, caller: &str, mut model: RawSignedModel) -> Result<RawSignedModel> {
        let card = Card::parse(&model)?;

        if card.identity != caller {
            return Err(Error::Unauthorized(format!(
                "caller {} cannot publish a card for {}",
                caller, card.identity
            )));
        }

        if card.signature_by(SELF_SIGNER).is_none() {
            return Err(Error::CardVerificationFailed(
                "card is missing its self signature".into(),
            ));
        }
        let self_only = VirgilCardVerifier::new(None).with_virgil_signature(false);
        if !self_only.verify_card(&card) {
            return Err(Error::CardVerificationFailed(
                "self signature does not verify".into(),
            ));
        }

        ModelSigner::new().sign(&mut model, VIRGIL_SIGNER, &self.service_key, None)?;

        let mut cards = self.cards.write();
        if cards.contains_key(&card.id) {
            return Err(Error::InvalidInput(format!("card {} already exists", card.id)));
        }

        if let Some(previous_id) = &card.previous_card_id {
            let previous = cards
                .get_mut(previous_id)
                .ok_or_else(|| Error::CardNotFound(previous_id.clone()))?;
            if previous.identity != card.identity {
                return Err(Error::InvalidInput(
                    "previous card belongs to another identity".into(),
                ));
            }
            if previous.superseded {
                return Err(Error::InvalidInput(format!(
                    "card {} is already superseded",
                    previous_id
                )));
            }
            previous.superseded = true;
        }

        cards.insert(
            card.id.clone(),
            StoredCard {
                identity: card.identity.clone(),
                created_at: card.created_at,
                model: model.clone(),
                superseded: false,
            },
        );

        tracing::info!("Published card {} for {}", card.id, card.identity);
        Ok(model)
    }

    /// Look up a card by id
    pub fn get(&self, card_id: &str) -> Result<CardLookup> {
        self.cards
            .read()
            .get(card_id)
            .map(|stored| CardLookup {
                model: stored.model.clone(),
                is_superseded: stored.superseded,
            })
            .ok_or_else(|| Error::CardNotFound(card_id.to_string()))
    }

    /// Every card of an identity, oldest first, superseded ones included
    pub fn search(&self, identity: &str) -> Vec<RawSignedModel> {
        let cards = self.cards.read();
        let mut found: Vec<&StoredCard> =
            cards.values().filter(|c| c.identity == identity).collect();
        found.sort_by_key(|c| c.created_at);
        found.into_iter().map(|c| c.model.clone()).collect()
    }

    /// Number of stored cards
    pub fn len(&self) -> usize {
        self.cards.read().len()
    }

    /// Whether no card has been published
    pub fn is_empty(&self) -> bool {
        self.cards.read().is_empty()
    }
}
