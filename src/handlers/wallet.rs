//! Wallet and ledger handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::error::ApiError;
use crate::ledger::{LedgerEntry, PostEntryRequest, PostingOutcome, Wallet};
use crate::models::{ApiResponse, LedgerQuery};
use crate::state::AppState;

/// GET /api/wallets/:id
pub async fn get_wallet(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Wallet>>, ApiError> {
    let wallet = state.ledger_service.get_wallet(&id).await?;
    Ok(Json(ApiResponse::ok(wallet)))
}

/// GET /api/wallets/:id/ledger
pub async fn list_ledger(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<LedgerQuery>,
) -> Result<Json<ApiResponse<Vec<LedgerEntry>>>, ApiError> {
    // 404 for unknown wallets rather than an empty page
    state.ledger_service.get_wallet(&id).await?;
    let entries = state.ledger_service.list_ledger(&id, query.limit).await?;
    Ok(Json(ApiResponse::ok(entries)))
}

/// POST /api/wallets/:id/entries
///
/// A replayed reference answers 200 with the original entry.
pub async fn post_entry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<PostEntryRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PostingOutcome>>), ApiError> {
    request.validate()?;

    let outcome = state
        .ledger_service
        .post_entry(
            id,
            request.amount,
            &request.transaction_reference,
            request.narration.as_deref(),
        )
        .await?;

    let status = match outcome {
        PostingOutcome::Posted(_) => StatusCode::CREATED,
        PostingOutcome::AlreadyApplied(_) => StatusCode::OK,
    };
    Ok((status, Json(ApiResponse::ok(outcome))))
}
