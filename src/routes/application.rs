//! Application intake routes

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn application_routes() -> Router<AppState> {
    Router::new()
        .route("/api/applications", post(create_application))
        .route(
            "/api/applications/:reference",
            get(get_application)
                .patch(update_application)
                .delete(delete_application),
        )
        .route("/api/applications/:reference/review", post(review_application))
        .route(
            "/api/applications/:reference/lender-match",
            post(request_lender_match).get(list_lender_matches),
        )
        .route(
            "/api/applications/:reference/offers",
            post(create_offer).get(list_offers),
        )
}
