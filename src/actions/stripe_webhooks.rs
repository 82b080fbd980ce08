use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use tracing::debug;

use crate::billing::WebhookError;
use crate::web::AppState;

use super::json_error;

/// POST /stripe/webhooks
///
/// Only verification problems are reported to Stripe. Every verified event is
/// acknowledged with 200, including ones whose processing failed; those failures
/// are logged and counted by the webhook service.
pub async fn handle_stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    // A header that is not valid ASCII cannot carry a valid signature
    let signature = headers
        .get("Stripe-Signature")
        .and_then(|value| value.to_str().ok());

    match state.webhooks.handle(&body, signature).await {
        Ok(receipt) => {
            debug!(
                event_id = %receipt.event_id,
                event_type = %receipt.event_type,
                processed = receipt.outcome.is_some(),
                "Acknowledged webhook"
            );
            Json(serde_json::json!({ "received": true })).into_response()
        }
        Err(WebhookError::NotConfigured) => json_error(
            StatusCode::NOT_IMPLEMENTED,
            "Stripe webhooks are not configured",
        )
        .into_response(),
        Err(WebhookError::InvalidSignature(_)) => {
            json_error(StatusCode::BAD_REQUEST, "Invalid Stripe signature").into_response()
        }
    }
}
