use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::provider::{BillingInterval, BillingProvider, ProviderSubscription};
use super::stores::SubscriberStore;
use crate::subscribers::{Subscriber, SubscriberBillingChanges, SubscriptionStatus};

pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanLabel {
    Monthly,
    Annual,
    Unknown,
}

/// Configured price ids for the two recurring plans
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanPrices {
    pub monthly: String,
    pub annual: String,
}

impl PlanPrices {
    /// Exact price id match first, then the billing interval
    pub fn label_for(&self, price_id: Option<&str>, interval: Option<BillingInterval>) -> PlanLabel {
        match (price_id, interval) {
            (Some(id), _) if id == self.monthly => PlanLabel::Monthly,
            (Some(id), _) if id == self.annual => PlanLabel::Annual,
            (_, Some(BillingInterval::Month)) => PlanLabel::Monthly,
            (_, Some(BillingInterval::Year)) => PlanLabel::Annual,
            _ => PlanLabel::Unknown,
        }
    }
}

/// Response body for the billing status query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingStatus {
    pub configured: bool,
    pub status: SubscriptionStatus,
    pub has_customer: bool,
    pub has_subscription: bool,
    pub plan: Option<PlanLabel>,
}

impl BillingStatus {
    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            status: SubscriptionStatus::Inactive,
            has_customer: false,
            has_subscription: false,
            plan: None,
        }
    }

    /// What the local row alone says
    fn from_stored(subscriber: &Subscriber) -> Self {
        let manual_active = subscriber.stripe_customer_id.is_none()
            && subscriber.subscription_status.is_active();
        Self {
            configured: true,
            status: subscriber.subscription_status,
            has_customer: subscriber.stripe_customer_id.is_some(),
            has_subscription: manual_active || subscriber.stripe_subscription_id.is_some(),
            plan: manual_active.then_some(PlanLabel::Unknown),
        }
    }
}

/// Answers "is this coach subscribed?" against the provider's live state,
/// falling back to the stored row when the provider is slow or failing.
#[derive(Clone)]
pub struct BillingStatusResolver {
    subscribers: Arc<dyn SubscriberStore>,
    provider: Option<Arc<dyn BillingProvider>>,
    prices: Option<PlanPrices>,
    timeout: Duration,
}

impl BillingStatusResolver {
    pub fn new(
        subscribers: Arc<dyn SubscriberStore>,
        provider: Option<(Arc<dyn BillingProvider>, PlanPrices)>,
        timeout: Duration,
    ) -> Self {
        let (provider, prices) = match provider {
            Some((provider, prices)) => (Some(provider), Some(prices)),
            None => (None, None),
        };
        Self {
            subscribers,
            provider,
            prices,
            timeout,
        }
    }

    pub async fn resolve(&self, subscriber: &Subscriber) -> BillingStatus {
        let (Some(provider), Some(prices)) = (self.provider.as_ref(), self.prices.as_ref()) else {
            return BillingStatus::unconfigured();
        };

        let stored = BillingStatus::from_stored(subscriber);
        let Some(customer_id) = subscriber.stripe_customer_id.as_deref() else {
            return stored;
        };

        let subscriptions =
            match tokio::time::timeout(self.timeout, provider.list_subscriptions(customer_id))
                .await
            {
                Ok(Ok(subscriptions)) => subscriptions,
                Ok(Err(e)) => {
                    metrics::counter!("billing.status.provider_errors").increment(1);
                    warn!(error = %e, subscriber_id = %subscriber.id, "Failed to load subscriptions, serving stored status");
                    return stored;
                }
                Err(_) => {
                    metrics::counter!("billing.status.provider_errors").increment(1);
                    warn!(
                        subscriber_id = %subscriber.id,
                        timeout_secs = self.timeout.as_secs(),
                        "Timed out loading subscriptions, serving stored status"
                    );
                    return stored;
                }
            };

        match subscriptions.iter().find(|s| s.status.is_active_like()) {
            Some(active) => {
                self.write_back(subscriber, active).await;
                BillingStatus {
                    configured: true,
                    status: SubscriptionStatus::Active,
                    has_customer: true,
                    has_subscription: true,
                    plan: Some(prices.label_for(active.price_id.as_deref(), active.interval)),
                }
            }
            None if subscriber.subscription_status.is_active() => BillingStatus {
                plan: Some(PlanLabel::Unknown),
                ..stored
            },
            None => BillingStatus {
                status: SubscriptionStatus::Inactive,
                ..stored
            },
        }
    }

    /// Best effort: failures are logged and the live answer is still returned
    async fn write_back(&self, subscriber: &Subscriber, active: &ProviderSubscription) {
        let changes = SubscriberBillingChanges {
            stripe_customer_id: None,
            stripe_subscription_id: (subscriber.stripe_subscription_id.as_deref()
                != Some(active.id.as_str()))
            .then(|| active.id.clone()),
            subscription_status: (!subscriber.subscription_status.is_active())
                .then_some(SubscriptionStatus::Active),
        };
        if changes == SubscriberBillingChanges::default() {
            return;
        }

        match self.subscribers.update_billing(subscriber.id, changes).await {
            Ok(_) => debug!(subscriber_id = %subscriber.id, subscription_id = %active.id, "Synced subscription from provider"),
            Err(e) => warn!(error = %e, subscriber_id = %subscriber.id, "Failed to store provider subscription state"),
        }
    }
}
