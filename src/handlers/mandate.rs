//! Mandate handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::error::ApiError;
use crate::mandate::{DebitMandate, MandateVerification};
use crate::models::ApiResponse;
use crate::state::AppState;

/// POST /api/offers/:reference/mandate
pub async fn generate_mandate(
    State(state): State<AppState>,
    Path(offer_reference): Path<String>,
) -> Result<(StatusCode, Json<ApiResponse<DebitMandate>>), ApiError> {
    let mandate = state
        .mandate_service
        .generate_mandate(&offer_reference)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(mandate))))
}

/// GET /api/mandates/pending
pub async fn find_pending_mandates(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<DebitMandate>>>, ApiError> {
    let mandates = state.mandate_service.find_pending_mandates().await?;
    Ok(Json(ApiResponse::ok(mandates)))
}

/// POST /api/mandates/:reference/verify
pub async fn verify_mandate(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<ApiResponse<MandateVerification>>, ApiError> {
    let verification = state.mandate_service.verify_mandate(&reference).await?;
    Ok(Json(ApiResponse::ok(verification)))
}

/// POST /api/mandates/:reference/revoke
pub async fn revoke_mandate(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<ApiResponse<DebitMandate>>, ApiError> {
    let mandate = state.mandate_service.revoke_mandate(&reference).await?;
    Ok(Json(ApiResponse::ok(mandate)))
}
