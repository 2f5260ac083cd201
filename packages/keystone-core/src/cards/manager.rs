//! Client-side card operations.
//!
//! Every card handed out by [`CardManager`] has passed its verifier.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::client::CardClient;
use super::model::{Card, RawCardContent, RawSignedModel, CARD_VERSION};
use super::signer::ModelSigner;
use super::verifier::CardVerifier;
use crate::auth::{AccessTokenProvider, TokenContext};
use crate::crypto::KeyPair;
use crate::error::{Error, Result};
use crate::time::now_timestamp;

/// Cards of one identity with their replacement chains resolved
///
/// Cards are owned by an id map; a card refers to its predecessor only by
/// id, resolved through [`ResolvedCards::previous_of`].
#[derive(Debug, Clone, Default)]
pub struct ResolvedCards {
    by_id: HashMap<String, Card>,
    heads: Vec<String>,
}

impl ResolvedCards {
    /// Resolve chains among `cards`
    ///
    /// A card named as another card's predecessor is marked outdated. Heads
    /// keep the input order.
    pub fn resolve(cards: Vec<Card>) -> Self {
        let predecessors: HashSet<String> = cards
            .iter()
            .filter_map(|c| c.previous_card_id.clone())
            .collect();

        let mut heads = Vec::new();
        let mut by_id = HashMap::with_capacity(cards.len());
        for mut card in cards {
            if predecessors.contains(&card.id) {
                card.is_outdated = true;
            } else if !card.is_outdated {
                heads.push(card.id.clone());
            }
            by_id.insert(card.id.clone(), card);
        }

        Self { by_id, heads }
    }

    /// Current cards, one per chain
    pub fn heads(&self) -> impl Iterator<Item = &Card> {
        self.heads.iter().filter_map(|id| self.by_id.get(id))
    }

    /// Any card in the set by id
    pub fn get(&self, card_id: &str) -> Option<&Card> {
        self.by_id.get(card_id)
    }

    /// The card `card` replaced, if it is in the set
    pub fn previous_of(&self, card: &Card) -> Option<&Card> {
        card.previous_card_id
            .as_deref()
            .and_then(|id| self.by_id.get(id))
    }

    /// Number of chain heads
    pub fn len(&self) -> usize {
        self.heads.len()
    }

    /// Whether no current card exists
    pub fn is_empty(&self) -> bool {
        self.heads.is_empty()
    }

    /// Take the chain heads
    pub fn into_heads(mut self) -> Vec<Card> {
        self.heads
            .iter()
            .filter_map(|id| self.by_id.remove(id))
            .collect()
    }
}

/// Creates, publishes and fetches verified cards
pub struct CardManager {
    client: Arc<dyn CardClient>,
    verifier: Arc<dyn CardVerifier>,
    tokens: Arc<dyn AccessTokenProvider>,
    signer: ModelSigner,
}

impl CardManager {
    /// Assemble a manager from its collaborators
    pub fn new(
        client: Arc<dyn CardClient>,
        verifier: Arc<dyn CardVerifier>,
        tokens: Arc<dyn AccessTokenProvider>,
    ) -> Self {
        Self {
            client,
            verifier,
            tokens,
            signer: ModelSigner::new(),
        }
    }

    /// Build a self-signed model for `key_pair`
    pub fn generate_raw_card(
        &self,
        key_pair: &KeyPair,
        identity: &str,
        previous_card_id: Option<&str>,
    ) -> Result<RawSignedModel> {
        if identity.is_empty() {
            return Err(Error::InvalidInput("identity must not be empty".into()));
        }

        let content = RawCardContent {
            identity: identity.to_string(),
            public_key: key_pair.public_keys().to_bytes().to_vec(),
            previous_card_id: previous_card_id.map(str::to_string),
            version: CARD_VERSION.to_string(),
            created_at: now_timestamp(),
        };

        let mut model = RawSignedModel::new(content.snapshot()?);
        self.signer.self_sign(&mut model, &key_pair.signing, None)?;
        Ok(model)
    }

    /// Publish a model and return the verified card
    ///
    /// The service must return the same identity and public key that were
    /// submitted.
    pub async fn publish_card(&self, model: RawSignedModel) -> Result<Card> {
        let submitted = Card::parse(&model)?;
        let token = self
            .tokens
            .get_token(TokenContext::new("cards", "publish"))
            .await?;

        let returned = self.client.publish_card(&model, &token).await?;
        let card = Card::parse(&returned)?;

        if card.identity != submitted.identity || card.public_key != submitted.public_key {
            return Err(Error::CardMismatch(format!(
                "published card {} does not match the submitted model",
                card.id
            )));
        }
        self.check(&card)?;

        tracing::info!("Card {} published for {}", card.id, card.identity);
        Ok(card)
    }

    /// Fetch and verify one card
    pub async fn get_card(&self, card_id: &str) -> Result<Card> {
        let token = self
            .tokens
            .get_token(TokenContext::new("cards", "get"))
            .await?;

        let lookup = self.client.get_card(card_id, &token).await?;
        let mut card = Card::parse(&lookup.model)?;

        if card.id != card_id {
            return Err(Error::CardMismatch(format!(
                "requested {} but received {}",
                card_id, card.id
            )));
        }
        self.check(&card)?;

        card.is_outdated = lookup.is_superseded;
        Ok(card)
    }

    /// Fetch, verify and chain-resolve the cards of an identity
    pub async fn search_cards(&self, identity: &str) -> Result<ResolvedCards> {
        let token = self
            .tokens
            .get_token(TokenContext::new("cards", "search"))
            .await?;

        let models = self.client.search_cards(identity, &token).await?;

        let mut cards = Vec::with_capacity(models.len());
        for model in &models {
            let card = Card::parse(model)?;
            if card.identity != identity {
                return Err(Error::CardMismatch(format!(
                    "search for {} returned a card for {}",
                    identity, card.identity
                )));
            }
            self.check(&card)?;
            cards.push(card);
        }

        tracing::debug!("Found {} card(s) for {}", cards.len(), identity);
        Ok(ResolvedCards::resolve(cards))
    }

    fn check(&self, card: &Card) -> Result<()> {
        if self.verifier.verify_card(card) {
            Ok(())
        } else {
            tracing::warn!("Card {} rejected by verifier", card.id);
            Err(Error::CardVerificationFailed(card.id.clone()))
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
