//! Offer routes

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn offer_routes() -> Router<AppState> {
    Router::new()
        .route("/api/offers/expire", post(expire_offers))
        .route("/api/offers/:reference", get(get_offer))
        .route("/api/offers/:reference/decision", post(decide_offer))
}
