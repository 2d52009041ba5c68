//! Wallet routes

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn wallet_routes() -> Router<AppState> {
    Router::new()
        .route("/api/wallets/:id", get(get_wallet))
        .route("/api/wallets/:id/ledger", get(list_ledger))
        .route("/api/wallets/:id/entries", post(post_entry))
}
