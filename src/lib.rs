//! VendCredit Backend Library
//!
//! Buy-now-pay-later credit lifecycle for vendors: application intake, offer
//! negotiation, direct-debit mandates, disbursement, repayment collection and
//! the wallet ledger every money movement is posted to.

pub mod application;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod handlers;
pub mod identifier;
pub mod ledger;
pub mod lender;
pub mod loan;
pub mod mandate;
pub mod middleware;
pub mod models;
pub mod offer;
pub mod providers;
pub mod repayment;
pub mod routes;
pub mod state;
pub mod webhook;

use axum::{routing::get, Router};

use middleware::RateLimiter;
use state::AppState;

/// Assemble every route with the shared middleware stack.
///
/// CORS and HSTS depend on deployment settings and are layered on by the
/// binary.
pub fn build_router(app_state: AppState, rate_limiter: RateLimiter) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(handlers::health_check))
        .merge(routes::application_routes())
        .merge(routes::offer_routes())
        .merge(routes::mandate_routes())
        .merge(routes::loan_routes())
        .merge(routes::wallet_routes())
        .merge(routes::webhook_routes())
        .with_state(app_state)
        .layer(axum::middleware::from_fn(middleware::security_headers))
        .layer(axum::middleware::from_fn(middleware::request_tracing))
        .layer(axum::middleware::from_fn(move |req, next| {
            let limiter = rate_limiter.clone();
            middleware::rate_limit_layer(limiter)(req, next)
        }))
}

async fn root() -> &'static str {
    "VendCredit API Server"
}
