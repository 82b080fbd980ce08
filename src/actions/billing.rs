use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use tracing::{error, warn};

use crate::auth::AuthUser;
use crate::billing::{CheckoutError, PlanChoice};
use crate::web::AppState;

use super::{RedirectUrlResponse, json_error};

#[derive(Debug, Default, Deserialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub plan: Option<String>,
}

/// Map a checkout failure to its HTTP response
pub(super) fn checkout_error_response(e: CheckoutError) -> Response {
    let status = match &e {
        CheckoutError::NotConfigured | CheckoutError::ShowcasePriceMissing => {
            StatusCode::NOT_IMPLEMENTED
        }
        CheckoutError::InvalidPlan(_) | CheckoutError::InvalidRequest(_) => {
            StatusCode::BAD_REQUEST
        }
        CheckoutError::ShowcaseNotFound => StatusCode::NOT_FOUND,
        CheckoutError::NoSubscription
        | CheckoutError::RegistrationClosed
        | CheckoutError::SoldOut => StatusCode::CONFLICT,
        CheckoutError::Provider(_) | CheckoutError::MissingCheckoutUrl => StatusCode::BAD_GATEWAY,
        CheckoutError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        error!(error = ?e, "Checkout request failed");
    } else {
        warn!(error = %e, "Checkout request rejected");
    }
    json_error(status, e.to_string()).into_response()
}

/// GET /billing/status
pub async fn get_billing_status(
    AuthUser(subscriber): AuthUser,
    State(state): State<AppState>,
) -> impl IntoResponse {
    Json(state.billing_status.resolve(&subscriber).await)
}

/// POST /billing/checkout
///
/// The body is optional; a missing plan means monthly.
pub async fn create_billing_checkout(
    AuthUser(subscriber): AuthUser,
    State(state): State<AppState>,
    body: Bytes,
) -> impl IntoResponse {
    let request: CheckoutRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CheckoutRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(request) => request,
            Err(e) => {
                return json_error(StatusCode::BAD_REQUEST, format!("Invalid request body: {e}"))
                    .into_response();
            }
        }
    };

    let plan = match request.plan.as_deref().map(str::parse::<PlanChoice>) {
        None => PlanChoice::Monthly,
        Some(Ok(plan)) => plan,
        Some(Err(e)) => return checkout_error_response(e),
    };

    match state
        .checkout
        .create_subscription_checkout(&subscriber, plan)
        .await
    {
        Ok(url) => Json(RedirectUrlResponse { url }).into_response(),
        Err(e) => checkout_error_response(e),
    }
}

/// POST /billing/portal
pub async fn create_billing_portal(
    AuthUser(subscriber): AuthUser,
    State(state): State<AppState>,
) -> impl IntoResponse {
    match state.checkout.create_portal_session(&subscriber).await {
        Ok(url) => Json(RedirectUrlResponse { url }).into_response(),
        Err(e) => checkout_error_response(e),
    }
}
