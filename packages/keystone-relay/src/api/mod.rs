//! REST endpoints of the Keystone services.
//!
//! ```text
//! POST /pythia/v1/brainkey          seed transform (+ proof)
//! POST /card/v5                     publish, countersigned by the relay
//! GET  /card/v5/:id                 x-virgil-is-superseeded header
//! POST /card/v5/actions/search      { identity }
//! PUT  /keyknox/v1                  Virgil-Keyknox-Previous-Hash CAS
//! GET  /keyknox/v1
//! POST /keyknox/v1/reset
//! ```
//!
//! Every endpoint requires `Authorization: <scheme> <token>`. The token is
//! taken as the caller's identity; this relay does not validate tokens.

mod cards;
mod keyknox;
mod pythia;

use axum::{
    http::{header::AUTHORIZATION, HeaderMap},
    routing::{get, post},
    Router,
};
use keystone_core::Error;

use crate::error::ApiError;
use crate::state::RelayState;

/// Routes of all three services.
pub fn routes() -> Router<RelayState> {
    Router::new()
        .route("/pythia/v1/brainkey", post(pythia::generate_seed))
        .route("/card/v5", post(cards::publish))
        .route("/card/v5/actions/search", post(cards::search))
        .route("/card/v5/:id", get(cards::get))
        .route("/keyknox/v1", get(keyknox::pull).put(keyknox::push))
        .route("/keyknox/v1/reset", post(keyknox::reset))
}

/// Caller identity from the `Authorization` header.
///
/// Accepts `<scheme> <token>` with any scheme.
pub fn caller(headers: &HeaderMap) -> Result<String, ApiError> {
    let value = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| Error::Unauthorized("missing Authorization header".into()))?;

    match value.split_once(' ') {
        Some((_scheme, token)) if !token.trim().is_empty() => Ok(token.trim().to_string()),
        _ => Err(Error::Unauthorized("malformed Authorization header".into()).into()),
    }
}
