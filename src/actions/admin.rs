use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::auth::AdminUser;
use crate::subscribers::{SubscriberBillingChanges, SubscriptionStatus};
use crate::web::AppState;

use super::json_error;

#[derive(Debug, Deserialize)]
pub struct SubscriptionStatusRequest {
    pub status: SubscriptionStatus,
}

/// PUT /admin/subscribers/{id}/subscription-status
///
/// Manual override. An active override on a subscriber with no provider
/// customer is what the billing status resolver reports as a manual plan.
pub async fn set_subscription_status(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(subscriber_id): Path<Uuid>,
    Json(request): Json<SubscriptionStatusRequest>,
) -> impl IntoResponse {
    match state
        .subscribers
        .update_billing(subscriber_id, SubscriberBillingChanges::status(request.status))
        .await
    {
        Ok(Some(subscriber)) => {
            info!(
                admin_id = %admin.id,
                %subscriber_id,
                status = ?request.status,
                "Subscription status overridden"
            );
            Json(subscriber).into_response()
        }
        Ok(None) => json_error(StatusCode::NOT_FOUND, "Subscriber not found").into_response(),
        Err(e) => {
            error!(error = %e, %subscriber_id, "Failed to override subscription status");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to update subscription status",
            )
            .into_response()
        }
    }
}
