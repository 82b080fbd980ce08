use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use stripe::{
    BillingPortalSession, CheckoutSession, CheckoutSessionMode, Client, CreateBillingPortalSession,
    CreateCheckoutSession, CreateCheckoutSessionLineItems, CreateCheckoutSessionSubscriptionData,
    CreateCustomer, Customer, CustomerId, ListSubscriptions, RecurringInterval, StripeError,
    Subscription, SubscriptionStatus, SubscriptionStatusFilter,
};
use tracing::info;

use crate::billing::{
    BillingInterval, BillingProvider, PlanPrices, ProviderSubscription,
    ProviderSubscriptionStatus, ShowcaseCheckoutRequest, SubscriptionCheckoutRequest,
    metadata::USER_ID, signature::DEFAULT_TOLERANCE,
};

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const SUBSCRIPTION_LIST_LIMIT: u64 = 10;

/// Configuration for Stripe integration
#[derive(Clone)]
pub struct StripeConfig {
    pub client: Client,
    pub webhook_secret: String,
    pub prices: PlanPrices,
    /// Base url of the web app, used for redirect and details links
    pub web_app_url: String,
    pub request_timeout: Duration,
    pub webhook_tolerance: Duration,
}

fn required(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).filter(|value| !value.trim().is_empty())
}

fn seconds(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: Duration,
) -> Result<Duration> {
    match required(lookup, name) {
        Some(value) => Ok(Duration::from_secs(
            value
                .trim()
                .parse()
                .with_context(|| format!("{name} must be a whole number of seconds"))?,
        )),
        None => Ok(default),
    }
}

impl StripeConfig {
    /// Initialize Stripe configuration from environment variables.
    ///
    /// Returns `Ok(None)` when any required value is missing, which puts billing
    /// into its unconfigured mode.
    pub fn from_env() -> Result<Option<Self>> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<Self>> {
        let values = (
            required(&lookup, "STRIPE_SECRET_KEY"),
            required(&lookup, "STRIPE_WEBHOOK_SECRET"),
            required(&lookup, "STRIPE_PRICE_ID_MONTHLY"),
            required(&lookup, "STRIPE_PRICE_ID_ANNUAL"),
            required(&lookup, "WEB_APP_URL"),
        );
        let (
            Some(secret_key),
            Some(webhook_secret),
            Some(monthly),
            Some(annual),
            Some(web_app_url),
        ) = values
        else {
            info!("Stripe is not fully configured; billing endpoints will report not configured");
            return Ok(None);
        };

        let request_timeout = seconds(
            &lookup,
            "STRIPE_REQUEST_TIMEOUT_SECS",
            Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        )?;
        let webhook_tolerance = seconds(&lookup, "STRIPE_WEBHOOK_TOLERANCE_SECS", DEFAULT_TOLERANCE)?;

        Ok(Some(Self {
            client: Client::new(secret_key),
            webhook_secret,
            prices: PlanPrices { monthly, annual },
            web_app_url: web_app_url.trim_end_matches('/').to_string(),
            request_timeout,
            webhook_tolerance,
        }))
    }
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("webhook_secret", &"[REDACTED]")
            .field("prices", &self.prices)
            .field("web_app_url", &self.web_app_url)
            .field("request_timeout", &self.request_timeout)
            .field("webhook_tolerance", &self.webhook_tolerance)
            .finish()
    }
}

/// `BillingProvider` backed by the Stripe API
#[derive(Clone)]
pub struct StripeBillingProvider {
    client: Client,
    timeout: Duration,
}

impl StripeBillingProvider {
    pub fn new(config: &StripeConfig) -> Self {
        Self {
            client: config.client.clone(),
            timeout: config.request_timeout,
        }
    }

    async fn call<T>(
        &self,
        operation: &'static str,
        request: impl Future<Output = Result<T, StripeError>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                metrics::counter!("stripe.api.errors", "operation" => operation).increment(1);
                Err(anyhow::Error::new(e).context(format!("Stripe {operation} failed")))
            }
            Err(_) => {
                metrics::counter!("stripe.api.errors", "operation" => operation).increment(1);
                Err(anyhow!(
                    "Stripe {operation} timed out after {}s",
                    self.timeout.as_secs()
                ))
            }
        }
    }
}

fn parse_customer_id(customer_id: &str) -> Result<CustomerId> {
    customer_id
        .parse()
        .map_err(|e| anyhow!("invalid Stripe customer id {customer_id:?}: {e}"))
}

fn provider_status(status: SubscriptionStatus) -> ProviderSubscriptionStatus {
    match status {
        SubscriptionStatus::Active => ProviderSubscriptionStatus::Active,
        SubscriptionStatus::Canceled => ProviderSubscriptionStatus::Canceled,
        SubscriptionStatus::Incomplete => ProviderSubscriptionStatus::Incomplete,
        SubscriptionStatus::IncompleteExpired => ProviderSubscriptionStatus::IncompleteExpired,
        SubscriptionStatus::PastDue => ProviderSubscriptionStatus::PastDue,
        SubscriptionStatus::Paused => ProviderSubscriptionStatus::Paused,
        SubscriptionStatus::Trialing => ProviderSubscriptionStatus::Trialing,
        SubscriptionStatus::Unpaid => ProviderSubscriptionStatus::Unpaid,
    }
}

fn billing_interval(interval: RecurringInterval) -> BillingInterval {
    match interval {
        RecurringInterval::Day => BillingInterval::Day,
        RecurringInterval::Week => BillingInterval::Week,
        RecurringInterval::Month => BillingInterval::Month,
        RecurringInterval::Year => BillingInterval::Year,
    }
}

impl From<Subscription> for ProviderSubscription {
    fn from(subscription: Subscription) -> Self {
        let price = subscription
            .items
            .data
            .first()
            .and_then(|item| item.price.as_ref());
        Self {
            id: subscription.id.to_string(),
            status: provider_status(subscription.status),
            price_id: price.map(|p| p.id.to_string()),
            interval: price
                .and_then(|p| p.recurring.as_ref())
                .map(|r| billing_interval(r.interval)),
        }
    }
}

#[async_trait]
impl BillingProvider for StripeBillingProvider {
    async fn customer_subscriber_reference(&self, customer_id: &str) -> Result<Option<String>> {
        let id = parse_customer_id(customer_id)?;
        let customer = self
            .call(
                "customers.retrieve",
                Customer::retrieve(&self.client, &id, &[]),
            )
            .await?;
        if customer.deleted {
            return Ok(None);
        }
        Ok(customer
            .metadata
            .and_then(|metadata| metadata.get(USER_ID).cloned())
            .filter(|value| !value.is_empty()))
    }

    async fn list_subscriptions(&self, customer_id: &str) -> Result<Vec<ProviderSubscription>> {
        let mut params = ListSubscriptions::new();
        params.customer = Some(parse_customer_id(customer_id)?);
        params.status = Some(SubscriptionStatusFilter::All);
        params.limit = Some(SUBSCRIPTION_LIST_LIMIT);

        let list = self
            .call("subscriptions.list", Subscription::list(&self.client, &params))
            .await?;
        Ok(list.data.into_iter().map(ProviderSubscription::from).collect())
    }

    async fn create_customer(
        &self,
        email: &str,
        metadata: HashMap<String, String>,
    ) -> Result<String> {
        let mut params = CreateCustomer::new();
        params.email = Some(email);
        params.metadata = Some(metadata);

        let customer = self
            .call("customers.create", Customer::create(&self.client, params))
            .await?;
        Ok(customer.id.to_string())
    }

    async fn create_subscription_checkout(
        &self,
        request: SubscriptionCheckoutRequest,
    ) -> Result<Option<String>> {
        let mut params = CreateCheckoutSession::new();
        params.mode = Some(CheckoutSessionMode::Subscription);
        params.customer = Some(parse_customer_id(&request.customer_id)?);
        params.allow_promotion_codes = Some(true);
        params.line_items = Some(vec![CreateCheckoutSessionLineItems {
            price: Some(request.price_id.clone()),
            quantity: Some(1),
            ..Default::default()
        }]);
        params.subscription_data = Some(CreateCheckoutSessionSubscriptionData {
            metadata: Some(request.metadata.clone()),
            ..Default::default()
        });
        params.metadata = Some(request.metadata.clone());
        params.success_url = Some(request.success_url.as_str());
        params.cancel_url = Some(request.cancel_url.as_str());

        let session = self
            .call(
                "checkout.sessions.create",
                CheckoutSession::create(&self.client, params),
            )
            .await?;
        Ok(session.url)
    }

    async fn create_portal_session(&self, customer_id: &str, return_url: &str) -> Result<String> {
        let mut params = CreateBillingPortalSession::new(parse_customer_id(customer_id)?);
        params.return_url = Some(return_url);

        let session = self
            .call(
                "billing_portal.sessions.create",
                BillingPortalSession::create(&self.client, params),
            )
            .await?;
        Ok(session.url)
    }

    async fn create_showcase_checkout(
        &self,
        request: ShowcaseCheckoutRequest,
    ) -> Result<Option<String>> {
        let mut params = CreateCheckoutSession::new();
        params.mode = Some(CheckoutSessionMode::Payment);
        params.customer_email = Some(request.customer_email.as_str());
        params.line_items = Some(vec![CreateCheckoutSessionLineItems {
            price: Some(request.price_id.clone()),
            quantity: Some(1),
            ..Default::default()
        }]);
        params.metadata = Some(request.metadata.clone());
        params.allow_promotion_codes = Some(request.allow_promotion_codes);
        params.success_url = Some(request.success_url.as_str());
        params.cancel_url = Some(request.cancel_url.as_str());

        let session = self
            .call(
                "checkout.sessions.create",
                CheckoutSession::create(&self.client, params),
            )
            .await?;
        Ok(session.url)
    }
}
