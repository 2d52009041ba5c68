//! Loan and repayment handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::error::ApiError;
use crate::loan::{Loan, LoanDetails};
use crate::models::{ApiResponse, DueDateQuery, ReconcileQuery};
use crate::repayment::{
    CollectionOutcome, ManualPaymentOutcome, ManualPaymentRequest, ReconcileReport,
    RepaymentSchedule, SweepReport,
};
use crate::state::AppState;

/// One year
const MAX_RECONCILE_WINDOW_MINUTES: i64 = 525_600;

/// GET /api/loans/:id
pub async fn get_loan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<LoanDetails>>, ApiError> {
    let loan = state.loan_service.get_loan(&id).await?;
    Ok(Json(ApiResponse::ok(loan)))
}

/// POST /api/loans/:id/disburse
pub async fn disburse_loan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Loan>>, ApiError> {
    let loan = state.loan_service.mark_disbursed(id).await?;
    Ok(Json(ApiResponse::ok(loan)))
}

/// POST /api/loans/:id/collect
pub async fn collect_repayment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<CollectionOutcome>>, ApiError> {
    let outcome = state.repayment_service.process_repayment_for_loan(id).await?;
    Ok(Json(ApiResponse::ok(outcome)))
}

/// POST /api/loans/:id/payments
pub async fn apply_manual_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ManualPaymentRequest>,
) -> Result<Json<ApiResponse<ManualPaymentOutcome>>, ApiError> {
    let outcome = state
        .repayment_service
        .apply_manual_payment(id, request)
        .await?;
    Ok(Json(ApiResponse::ok(outcome)))
}

/// POST /api/loans/:id/close
pub async fn close_loan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Loan>>, ApiError> {
    let loan = state.repayment_service.close_loan(id).await?;
    Ok(Json(ApiResponse::ok(loan)))
}

/// GET /api/repayments/due?date=YYYY-MM-DD
pub async fn repayments_due(
    State(state): State<AppState>,
    Query(query): Query<DueDateQuery>,
) -> Result<Json<ApiResponse<Vec<RepaymentSchedule>>>, ApiError> {
    let date = query.date.unwrap_or_else(|| chrono::Utc::now().date_naive());
    let rows = state
        .repayment_service
        .get_repayments_due_on_date(date)
        .await?;
    Ok(Json(ApiResponse::ok(rows)))
}

/// POST /api/repayments/sweep?date=YYYY-MM-DD
pub async fn sweep_due_repayments(
    State(state): State<AppState>,
    Query(query): Query<DueDateQuery>,
) -> Result<Json<ApiResponse<SweepReport>>, ApiError> {
    let date = query.date.unwrap_or_else(|| chrono::Utc::now().date_naive());
    let report = state.repayment_service.process_due_repayments(date).await?;
    Ok(Json(ApiResponse::ok(report)))
}

/// POST /api/collections/:reference/reconcile
pub async fn reconcile_collection(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<ApiResponse<CollectionOutcome>>, ApiError> {
    let outcome = state
        .repayment_service
        .reconcile_collection(&reference)
        .await?;
    Ok(Json(ApiResponse::ok(outcome)))
}

/// POST /api/repayments/reconcile?older_than_minutes=30
pub async fn reconcile_stale_collections(
    State(state): State<AppState>,
    Query(query): Query<ReconcileQuery>,
) -> Result<Json<ApiResponse<ReconcileReport>>, ApiError> {
    if !(0..=MAX_RECONCILE_WINDOW_MINUTES).contains(&query.older_than_minutes) {
        return Err(ApiError::ValidationError(format!(
            "older_than_minutes must be between 0 and {}",
            MAX_RECONCILE_WINDOW_MINUTES
        )));
    }
    let report = state
        .repayment_service
        .reconcile_stale_collections(chrono::Duration::minutes(query.older_than_minutes))
        .await?;
    Ok(Json(ApiResponse::ok(report)))
}
