//! Inbound provider webhooks

use axum::{routing::post, Router};

use crate::handlers::receive_webhook;
use crate::state::AppState;

pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/api/webhooks/:provider", post(receive_webhook))
}
