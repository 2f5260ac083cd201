//! Transport for the card service.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::model::RawSignedModel;
use super::registry::{CardLookup, CardRegistry};
use crate::auth::AccessToken;
use crate::config::ServiceConfig;
use crate::error::{Error, Result};
use crate::http;

/// Base path of the card service
pub const CARDS_PATH: &str = "/card/v5";

/// Response header flagging a superseded card
pub const SUPERSEEDED_HEADER: &str = "x-virgil-is-superseeded";

/// `POST /card/v5/actions/search` body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Identity to look up
    pub identity: String,
}

/// Talks to a card service
#[async_trait]
pub trait CardClient: Send + Sync {
    /// Publish a self-signed model and get back the countersigned one
    async fn publish_card(
        &self,
        model: &RawSignedModel,
        token: &AccessToken,
    ) -> Result<RawSignedModel>;

    /// Fetch a card by id
    async fn get_card(&self, card_id: &str, token: &AccessToken) -> Result<CardLookup>;

    /// Every card of an identity
    async fn search_cards(
        &self,
        identity: &str,
        token: &AccessToken,
    ) -> Result<Vec<RawSignedModel>>;
}

/// Card client over HTTP
#[derive(Debug, Clone)]
pub struct HttpCardClient {
    http: reqwest::Client,
    base_url: String,
    auth_scheme: String,
}

impl HttpCardClient {
    /// Client for a service base URL
    pub fn new(base_url: impl Into<String>, auth_scheme: impl Into<String>) -> Self {
        Self {
            http: http::build_client(),
            base_url: base_url.into(),
            auth_scheme: auth_scheme.into(),
        }
    }

    /// Client for the configured card service
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(config.card_service_url.clone(), config.auth_scheme.clone())
    }

    fn authorization(&self, token: &AccessToken) -> String {
        format!("{} {}", self.auth_scheme, token.value)
    }
}

#[async_trait]
impl CardClient for HttpCardClient {
    async fn publish_card(
        &self,
        model: &RawSignedModel,
        token: &AccessToken,
    ) -> Result<RawSignedModel> {
        let response = self
            .http
            .post(http::join(&self.base_url, CARDS_PATH))
            .header(reqwest::header::AUTHORIZATION, self.authorization(token))
            .json(model)
            .send()
            .await?;

        let response = http::check_status(response).await?;
        Ok(response.json().await?)
    }

    async fn get_card(&self, card_id: &str, token: &AccessToken) -> Result<CardLookup> {
        let url = http::join(&self.base_url, &format!("{}/{}", CARDS_PATH, card_id));
        let response = self
            .http
            .get(url)
            .header(reqwest::header::AUTHORIZATION, self.authorization(token))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::CardNotFound(card_id.to_string()));
        }
        let response = http::check_status(response).await?;

        let is_superseded = response
            .headers()
            .get(SUPERSEEDED_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(CardLookup {
            model: response.json().await?,
            is_superseded,
        })
    }

    async fn search_cards(
        &self,
        identity: &str,
        token: &AccessToken,
    ) -> Result<Vec<RawSignedModel>> {
        let response = self
            .http
            .post(http::join(
                &self.base_url,
                &format!("{}/actions/search", CARDS_PATH),
            ))
            .header(reqwest::header::AUTHORIZATION, self.authorization(token))
            .json(&SearchRequest {
                identity: identity.to_string(),
            })
            .send()
            .await?;

        let response = http::check_status(response).await?;
        Ok(response.json().await?)
    }
}

/// Card client that calls a [`CardRegistry`] in process
///
/// The token value is taken as the caller identity.
#[derive(Clone)]
pub struct LocalCardClient {
    registry: Arc<CardRegistry>,
}

impl LocalCardClient {
    /// Wrap a registry
    pub fn new(registry: Arc<CardRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl CardClient for LocalCardClient {
    async fn publish_card(
        &self,
        model: &RawSignedModel,
        token: &AccessToken,
    ) -> Result<RawSignedModel> {
        self.registry.publish(&token.value, model.clone())
    }

    async fn get_card(&self, card_id: &str, _token: &AccessToken) -> Result<CardLookup> {
        self.registry.get(card_id)
    }

    async fn search_cards(
        &self,
        identity: &str,
        _token: &AccessToken,
    ) -> Result<Vec<RawSignedModel>> {
        Ok(self.registry.search(identity))
    }
}
