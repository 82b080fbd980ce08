use thiserror::Error;

/// Failures that reject a webhook delivery before any state is touched
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("webhook verification is not configured")]
    NotConfigured,
}

/// Failures while starting a hosted checkout or portal session
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("billing is not configured")]
    NotConfigured,

    #[error("invalid plan: {0}")]
    InvalidPlan(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("no subscription to manage")]
    NoSubscription,

    #[error("showcase not found")]
    ShowcaseNotFound,

    #[error("registration is closed")]
    RegistrationClosed,

    #[error("showcase is sold out")]
    SoldOut,

    #[error("showcase has no price configured")]
    ShowcasePriceMissing,

    #[error("provider returned a session without a url")]
    MissingCheckoutUrl,

    #[error("payment provider error: {0}")]
    Provider(anyhow::Error),

    #[error("storage error: {0}")]
    Storage(anyhow::Error),
}
