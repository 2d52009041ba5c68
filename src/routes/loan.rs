//! Loan and repayment route definitions

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn loan_routes() -> Router<AppState> {
    Router::new()
        .route("/api/loans/:id", get(get_loan))
        .route("/api/loans/:id/disburse", post(disburse_loan))
        .route("/api/loans/:id/collect", post(collect_repayment))
        .route("/api/loans/:id/payments", post(apply_manual_payment))
        .route("/api/loans/:id/close", post(close_loan))
        .route("/api/repayments/due", get(repayments_due))
        .route("/api/repayments/sweep", post(sweep_due_repayments))
        .route("/api/repayments/reconcile", post(reconcile_stale_collections))
        .route(
            "/api/collections/:reference/reconcile",
            post(reconcile_collection),
        )
}
