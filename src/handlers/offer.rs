//! Offer decision handlers

use axum::{
    extract::{Path, State},
    Json,
};

use crate::error::ApiError;
use crate::models::ApiResponse;
use crate::offer::{AcceptanceOutcome, CreditOffer, OfferDecision};
use crate::state::AppState;

/// GET /api/offers/:reference
pub async fn get_offer(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<ApiResponse<CreditOffer>>, ApiError> {
    let offer = state.offer_service.get_offer(&reference).await?;
    Ok(Json(ApiResponse::ok(offer)))
}

/// POST /api/offers/:reference/decision
pub async fn decide_offer(
    State(state): State<AppState>,
    Path(reference): Path<String>,
    Json(decision): Json<OfferDecision>,
) -> Result<Json<ApiResponse<AcceptanceOutcome>>, ApiError> {
    let outcome = state
        .offer_service
        .accept_or_reject_offer(&reference, decision)
        .await?;
    Ok(Json(ApiResponse::ok(outcome)))
}

/// POST /api/offers/expire
pub async fn expire_offers(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<u64>>, ApiError> {
    let expired = state.offer_service.expire_offers(chrono::Utc::now()).await?;
    Ok(Json(ApiResponse::ok(expired)))
}
