use axum::{
    extract::{Path, State},
    response::{IntoResponse, Json},
};

use crate::auth::AuthUser;
use crate::billing::ShowcaseRegistrationRequest;
use crate::web::AppState;

use super::RedirectUrlResponse;
use super::billing::checkout_error_response;

/// POST /showcases/{id_or_slug}/register
/// Start a one-time showcase payment; the registration itself is written by the webhook
pub async fn register_for_showcase(
    AuthUser(purchaser): AuthUser,
    State(state): State<AppState>,
    Path(id_or_slug): Path<String>,
    Json(request): Json<ShowcaseRegistrationRequest>,
) -> impl IntoResponse {
    match state
        .checkout
        .create_showcase_checkout(&id_or_slug, request, Some(&purchaser))
        .await
    {
        Ok(url) => Json(RedirectUrlResponse { url }).into_response(),
        Err(e) => checkout_error_response(e),
    }
}
