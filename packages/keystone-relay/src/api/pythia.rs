//! BrainKey seed endpoint.

use axum::{extract::State, http::HeaderMap, Json};
use keystone_core::brainkey::{SeedRequest, SeedResponse};

use super::caller;
use crate::error::ApiResult;
use crate::state::RelayState;

/// Transform a blinded password.
///
/// POST /pythia/v1/brainkey
/// Body: { "blinded_password": "...", "brainkey_id": "...", "include_proof": true }
pub async fn generate_seed(
    State(state): State<RelayState>,
    headers: HeaderMap,
    Json(request): Json<SeedRequest>,
) -> ApiResult<Json<SeedResponse>> {
    let identity = caller(&headers)?;
    let response = state.seeds.generate_seed(&request)?;

    tracing::debug!(
        caller = identity.as_str(),
        proof = request.include_proof,
        "Seed generated"
    );
    state.record("pythia.seed");
    Ok(Json(response))
}
