pub mod admin;
pub mod billing;
pub mod showcases;
pub mod stripe_webhooks;

pub use admin::*;
pub use billing::*;
pub use showcases::*;
pub use stripe_webhooks::*;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;

/// Error body shared by every JSON endpoint: `{"error": "..."}`
pub fn json_error(status: StatusCode, message: impl Into<String>) -> impl IntoResponse {
    (
        status,
        Json(serde_json::json!({ "error": message.into() })),
    )
}

/// Body returned by endpoints that hand back a hosted provider page
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedirectUrlResponse {
    pub url: String,
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
