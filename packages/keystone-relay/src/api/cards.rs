//! Card service endpoints.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use keystone_core::cards::{RawSignedModel, SearchRequest, SUPERSEEDED_HEADER};

use super::caller;
use crate::error::ApiResult;
use crate::state::RelayState;

/// Publish a self-signed card.
///
/// POST /card/v5
pub async fn publish(
    State(state): State<RelayState>,
    headers: HeaderMap,
    Json(model): Json<RawSignedModel>,
) -> ApiResult<Json<RawSignedModel>> {
    let identity = caller(&headers)?;
    let published = state.cards.publish(&identity, model)?;

    state.record("cards.publish");
    Ok(Json(published))
}

/// Fetch a card by id.
///
/// GET /card/v5/:id
pub async fn get(
    State(state): State<RelayState>,
    headers: HeaderMap,
    Path(card_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    caller(&headers)?;
    let lookup = state.cards.get(&card_id)?;

    state.record("cards.get");
    Ok((
        [(SUPERSEEDED_HEADER, lookup.is_superseded.to_string())],
        Json(lookup.model),
    ))
}

/// All cards of an identity.
///
/// POST /card/v5/actions/search
/// Body: { "identity": "alice" }
pub async fn search(
    State(state): State<RelayState>,
    headers: HeaderMap,
    Json(request): Json<SearchRequest>,
) -> ApiResult<Json<Vec<RawSignedModel>>> {
    caller(&headers)?;
    let cards = state.cards.search(&request.identity);

    state.record("cards.search");
    Ok(Json(cards))
}
