//! Liveness and database health

use axum::{extract::State, http::StatusCode, Json};

use crate::db::HealthReport;
use crate::state::AppState;

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let report = HealthReport::probe(&state.db_pool).await;
    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}
