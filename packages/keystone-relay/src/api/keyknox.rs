//! Keyknox endpoints.

use axum::{extract::State, http::HeaderMap, response::IntoResponse, Json};
use keystone_core::encoding::{from_base64, to_base64};
use keystone_core::keyknox::{
    EncryptedKeyknoxValue, KeyknoxPushRequest, KeyknoxResponse, HASH_HEADER, PREVIOUS_HASH_HEADER,
};
use keystone_core::Error;

use super::caller;
use crate::error::ApiResult;
use crate::state::RelayState;

fn respond(value: EncryptedKeyknoxValue) -> impl IntoResponse {
    let (body, hash) = KeyknoxResponse::from_value(value);
    ([(HASH_HEADER, to_base64(&hash))], Json(body))
}

/// Replace the caller's value.
///
/// PUT /keyknox/v1
/// Header: Virgil-Keyknox-Previous-Hash (optional)
/// Body: { "meta": "...", "value": "..." }
pub async fn push(
    State(state): State<RelayState>,
    headers: HeaderMap,
    Json(request): Json<KeyknoxPushRequest>,
) -> ApiResult<impl IntoResponse> {
    let owner = caller(&headers)?;

    let previous_hash = match headers.get(PREVIOUS_HASH_HEADER) {
        Some(value) => {
            let text = value.to_str().map_err(|_| Error::InvalidPreviousHashHeader)?;
            Some(from_base64(text).map_err(|_| Error::InvalidPreviousHashHeader)?)
        }
        None => None,
    };

    let stored = state.keyknox.push(
        &owner,
        request.meta,
        request.value,
        previous_hash.as_deref(),
    )?;

    state.record("keyknox.push");
    Ok(respond(stored))
}

/// The caller's current value.
///
/// GET /keyknox/v1
pub async fn pull(
    State(state): State<RelayState>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let owner = caller(&headers)?;
    let stored = state.keyknox.pull(&owner);

    state.record("keyknox.pull");
    Ok(respond(stored))
}

/// Erase the caller's value.
///
/// POST /keyknox/v1/reset
pub async fn reset(
    State(state): State<RelayState>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let owner = caller(&headers)?;
    let stored = state.keyknox.reset(&owner);

    state.record("keyknox.reset");
    Ok(respond(stored))
}
