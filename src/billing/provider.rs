use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Subscription status as reported by the provider.
///
/// Statuses this crate does not know about decode as `Unknown` instead of failing
/// the whole event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderSubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Canceled,
    Unpaid,
    Incomplete,
    IncompleteExpired,
    Paused,
    #[serde(other)]
    Unknown,
}

impl ProviderSubscriptionStatus {
    /// Statuses that still grant access to paid features
    pub fn is_active_like(self) -> bool {
        matches!(
            self,
            ProviderSubscriptionStatus::Active
                | ProviderSubscriptionStatus::Trialing
                | ProviderSubscriptionStatus::PastDue
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingInterval {
    Day,
    Week,
    Month,
    Year,
}

/// The fields of a provider subscription the resolver needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSubscription {
    pub id: String,
    pub status: ProviderSubscriptionStatus,
    pub price_id: Option<String>,
    pub interval: Option<BillingInterval>,
}

/// Parameters for a recurring-plan checkout
#[derive(Debug, Clone)]
pub struct SubscriptionCheckoutRequest {
    pub customer_id: String,
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
    /// Copied to both the session and the subscription it creates
    pub metadata: HashMap<String, String>,
}

/// Parameters for a one-time showcase payment checkout
#[derive(Debug, Clone)]
pub struct ShowcaseCheckoutRequest {
    pub price_id: String,
    pub customer_email: String,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: HashMap<String, String>,
    pub allow_promotion_codes: bool,
}

/// Outbound calls to the payment provider.
///
/// Implemented by the Stripe client in production and by scripted fakes in tests.
#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// The local subscriber id recorded in the customer's `userId` metadata, if any
    async fn customer_subscriber_reference(&self, customer_id: &str) -> Result<Option<String>>;

    /// Up to ten subscriptions for the customer, in any status
    async fn list_subscriptions(&self, customer_id: &str) -> Result<Vec<ProviderSubscription>>;

    /// Create a customer carrying the given metadata; returns the customer id
    async fn create_customer(
        &self,
        email: &str,
        metadata: HashMap<String, String>,
    ) -> Result<String>;

    /// Returns the hosted checkout url
    async fn create_subscription_checkout(
        &self,
        request: SubscriptionCheckoutRequest,
    ) -> Result<Option<String>>;

    /// Returns the hosted billing portal url
    async fn create_portal_session(&self, customer_id: &str, return_url: &str) -> Result<String>;

    /// Returns the hosted checkout url
    async fn create_showcase_checkout(
        &self,
        request: ShowcaseCheckoutRequest,
    ) -> Result<Option<String>>;
}
