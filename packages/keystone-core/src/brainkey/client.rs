//! Transport for the seed exchange.

use std::sync::Arc;

use async_trait::async_trait;

use super::service::{SeedRequest, SeedResponse, SeedService};
use crate::auth::AccessToken;
use crate::config::ServiceConfig;
use crate::error::Result;
use crate::http;

/// Path of the seed endpoint
pub const SEED_PATH: &str = "/pythia/v1/brainkey";

/// Asks a transformation service for a seed
#[async_trait]
pub trait PythiaClient: Send + Sync {
    /// Send a blinded password and receive its transform
    async fn generate_seed(
        &self,
        request: &SeedRequest,
        token: &AccessToken,
    ) -> Result<SeedResponse>;
}

/// Seed client over HTTP
#[derive(Debug, Clone)]
pub struct HttpPythiaClient {
    http: reqwest::Client,
    base_url: String,
    auth_scheme: String,
}

impl HttpPythiaClient {
    /// Client for a service base URL
    pub fn new(base_url: impl Into<String>, auth_scheme: impl Into<String>) -> Self {
        Self {
            http: http::build_client(),
            base_url: base_url.into(),
            auth_scheme: auth_scheme.into(),
        }
    }

    /// Client for the configured Pythia endpoint
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(config.pythia_url.clone(), config.auth_scheme.clone())
    }
}

#[async_trait]
impl PythiaClient for HttpPythiaClient {
    async fn generate_seed(
        &self,
        request: &SeedRequest,
        token: &AccessToken,
    ) -> Result<SeedResponse> {
        let response = self
            .http
            .post(http::join(&self.base_url, SEED_PATH))
            .header(
                reqwest::header::AUTHORIZATION,
                format!("{} {}", self.auth_scheme, token.value),
            )
            .json(request)
            .send()
            .await?;

        let response = http::check_status(response).await?;
        Ok(response.json::<SeedResponse>().await?)
    }
}

/// Seed client that calls a [`SeedService`] in process
#[derive(Debug, Clone)]
pub struct LocalPythiaClient {
    service: Arc<SeedService>,
}

impl LocalPythiaClient {
    /// Wrap a seed service
    pub fn new(service: Arc<SeedService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl PythiaClient for LocalPythiaClient {
    async fn generate_seed(
        &self,
        request: &SeedRequest,
        _token: &AccessToken,
    ) -> Result<SeedResponse> {
        self.service.generate_seed(request)
    }
}
