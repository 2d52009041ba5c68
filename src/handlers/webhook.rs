//! Provider webhook endpoint

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    Json,
};

use crate::error::ApiError;
use crate::models::ApiResponse;
use crate::state::AppState;
use crate::webhook::{WebhookReceipt, SIGNATURE_HEADER};

/// POST /api/webhooks/:provider
///
/// Takes the raw body so the signature is checked over the exact bytes the
/// provider signed.
pub async fn receive_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ApiResponse<WebhookReceipt>>, ApiError> {
    if !state.webhook_service.is_configured(&provider) {
        // Fail closed
        tracing::error!(provider = %provider, "Webhook integration not configured - rejecting request");
        return Err(ApiError::ServiceUnavailable(format!(
            "Webhook integration '{}' is not configured",
            provider
        )));
    }

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok());

    let receipt = state
        .webhook_service
        .handle(&provider, &body, signature)
        .await?;

    Ok(Json(ApiResponse::ok(receipt)))
}
