//! Mandate routes

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn mandate_routes() -> Router<AppState> {
    Router::new()
        .route("/api/offers/:reference/mandate", post(generate_mandate))
        .route("/api/mandates/pending", get(find_pending_mandates))
        .route("/api/mandates/:reference/verify", post(verify_mandate))
        .route("/api/mandates/:reference/revoke", post(revoke_mandate))
}
