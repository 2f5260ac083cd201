//! # Access Tokens
//!
//! Every remote call carries an opaque bearer token. The core never parses
//! tokens; it only asks a provider for one and forwards it.
//!
//! ```text
//! ┌──────────────────────┐  get_token(ctx)  ┌──────────────────────────┐
//! │ BrainKey / Keyknox / │ ───────────────► │ AccessTokenProvider      │
//! │ CardManager          │ ◄─────────────── │  Const / Caching / app   │
//! └──────────────────────┘   AccessToken    └──────────────────────────┘
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::time::now_timestamp;

/// Seconds before expiry at which a cached token is refreshed.
pub const REFRESH_MARGIN_SECS: i64 = 5;

/// Opaque bearer token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    /// Token text placed in the `Authorization` header
    pub value: String,
    /// Unix timestamp after which the token is no longer valid
    pub expires_at: Option<i64>,
}

impl AccessToken {
    /// Token that never expires
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            expires_at: None,
        }
    }

    /// Token with an expiry
    pub fn expiring(value: impl Into<String>, expires_at: i64) -> Self {
        Self {
            value: value.into(),
            expires_at: Some(expires_at),
        }
    }

    /// Whether the token is expired (or about to be) at `now`
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at
            .map(|exp| now + REFRESH_MARGIN_SECS >= exp)
            .unwrap_or(false)
    }
}

/// What a token is requested for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenContext {
    /// Service name, e.g. `"keyknox"`
    pub service: &'static str,
    /// Operation name, e.g. `"put"`
    pub operation: &'static str,
    /// Bypass any cache
    pub force_reload: bool,
}

impl TokenContext {
    /// Context for a service operation
    pub const fn new(service: &'static str, operation: &'static str) -> Self {
        Self {
            service,
            operation,
            force_reload: false,
        }
    }
}

/// Supplies access tokens
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    /// Get a token for the given context
    async fn get_token(&self, context: TokenContext) -> Result<AccessToken>;
}

/// Always returns the same token
#[derive(Debug, Clone)]
pub struct ConstAccessTokenProvider {
    token: AccessToken,
}

impl ConstAccessTokenProvider {
    /// Provider for a fixed token
    pub fn new(token: AccessToken) -> Self {
        Self { token }
    }
}

#[async_trait]
impl AccessTokenProvider for ConstAccessTokenProvider {
    async fn get_token(&self, _context: TokenContext) -> Result<AccessToken> {
        if self.token.value.is_empty() {
            return Err(Error::Unauthorized("empty access token".into()));
        }
        Ok(self.token.clone())
    }
}

/// Caches tokens from an inner provider until they expire
pub struct CachingTokenProvider<P> {
    inner: P,
    cached: Mutex<Option<AccessToken>>,
}

impl<P: AccessTokenProvider> CachingTokenProvider<P> {
    /// Wrap a provider
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            cached: Mutex::new(None),
        }
    }
}

#[async_trait]
impl<P: AccessTokenProvider> AccessTokenProvider for CachingTokenProvider<P> {
    async fn get_token(&self, context: TokenContext) -> Result<AccessToken> {
        if !context.force_reload {
            let cached = self.cached.lock().clone();
            if let Some(token) = cached {
                if !token.is_expired_at(now_timestamp()) {
                    return Ok(token);
                }
            }
        }

        tracing::debug!(
            "Refreshing access token for {}/{}",
            context.service,
            context.operation
        );
        let token = self.inner.get_token(context).await?;
        *self.cached.lock() = Some(token.clone());
        Ok(token)
    }
}

// ============================================================================
// TESTS
// ============================================================================
