//! Application intake and lender matching handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::application::{ApplicationPatch, CreateApplicationRequest, LoanApplication, ReviewDecision};
use crate::error::ApiError;
use crate::lender::{LenderMatch, LenderMatchRequest};
use crate::models::ApiResponse;
use crate::offer::{CreateOfferRequest, CreditOffer};
use crate::state::AppState;

/// POST /api/applications
pub async fn create_application(
    State(state): State<AppState>,
    Json(request): Json<CreateApplicationRequest>,
) -> Result<(StatusCode, Json<ApiResponse<LoanApplication>>), ApiError> {
    let application = state.application_service.create_application(request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(application))))
}

/// GET /api/applications/:reference
pub async fn get_application(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<ApiResponse<LoanApplication>>, ApiError> {
    let application = state.application_service.get_application(&reference).await?;
    Ok(Json(ApiResponse::ok(application)))
}

/// PATCH /api/applications/:reference
pub async fn update_application(
    State(state): State<AppState>,
    Path(reference): Path<String>,
    Json(patch): Json<ApplicationPatch>,
) -> Result<Json<ApiResponse<LoanApplication>>, ApiError> {
    let application = state
        .application_service
        .update_application(&reference, patch)
        .await?;
    Ok(Json(ApiResponse::ok(application)))
}

/// DELETE /api/applications/:reference
pub async fn delete_application(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.application_service.delete_application(&reference).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/applications/:reference/review
pub async fn review_application(
    State(state): State<AppState>,
    Path(reference): Path<String>,
    Json(decision): Json<ReviewDecision>,
) -> Result<Json<ApiResponse<LoanApplication>>, ApiError> {
    let application = state
        .application_service
        .review_application(&reference, decision)
        .await?;
    Ok(Json(ApiResponse::ok(application)))
}

/// POST /api/applications/:reference/lender-match
pub async fn request_lender_match(
    State(state): State<AppState>,
    Path(reference): Path<String>,
    Json(request): Json<LenderMatchRequest>,
) -> Result<Json<ApiResponse<LenderMatch>>, ApiError> {
    let lender_match = state
        .lender_service
        .request_lender_match(&reference, request)
        .await?;
    Ok(Json(ApiResponse::ok(lender_match)))
}

/// GET /api/applications/:reference/lender-match
pub async fn list_lender_matches(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<ApiResponse<Vec<LenderMatch>>>, ApiError> {
    let application = state.application_service.get_application(&reference).await?;
    let matches = state.lender_service.list_matches(application.id).await?;
    Ok(Json(ApiResponse::ok(matches)))
}

/// POST /api/applications/:reference/offers
pub async fn create_offer(
    State(state): State<AppState>,
    Path(reference): Path<String>,
    Json(request): Json<CreateOfferRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CreditOffer>>), ApiError> {
    let offer = state.offer_service.create_offer(&reference, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(offer))))
}

/// GET /api/applications/:reference/offers
pub async fn list_offers(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<ApiResponse<Vec<CreditOffer>>>, ApiError> {
    let application = state.application_service.get_application(&reference).await?;
    let offers = state.offer_service.list_offers(application.id).await?;
    Ok(Json(ApiResponse::ok(offers)))
}
