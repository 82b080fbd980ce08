use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};
use uuid::Uuid;

use super::events::{CheckoutSessionObject, ObjectRef, SubscriptionObject};
use super::metadata;
use super::provider::{BillingProvider, ProviderSubscriptionStatus};
use super::stores::SubscriberStore;
use crate::subscribers::{Subscriber, SubscriberBillingChanges, SubscriptionStatus};

/// Collapse the provider's status set onto the local two-state flag.
///
/// `past_due` still counts as active so a failed renewal does not cut access
/// while the provider retries the charge.
pub fn map_provider_status(status: ProviderSubscriptionStatus) -> SubscriptionStatus {
    if status.is_active_like() {
        SubscriptionStatus::Active
    } else {
        SubscriptionStatus::Inactive
    }
}

/// A subscriber found for a provider customer id
#[derive(Debug, Clone)]
pub struct ResolvedSubscriber {
    pub subscriber: Subscriber,
    /// The customer id was written to the subscriber during this resolution
    pub newly_linked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionOutcome {
    Updated {
        subscriber_id: Uuid,
        status: SubscriptionStatus,
    },
    /// Checkout completion attached provider ids without touching status
    Linked { subscriber_id: Uuid },
    /// No local subscriber matches; nothing written
    Unresolved { customer_id: Option<String> },
}

/// Keeps subscriber rows in step with provider subscription events
#[derive(Clone)]
pub struct SubscriptionReconciler {
    subscribers: Arc<dyn SubscriberStore>,
    provider: Arc<dyn BillingProvider>,
}

impl SubscriptionReconciler {
    pub fn new(subscribers: Arc<dyn SubscriberStore>, provider: Arc<dyn BillingProvider>) -> Self {
        Self {
            subscribers,
            provider,
        }
    }

    /// Find the subscriber for a customer id.
    ///
    /// Falls back to the `userId` recorded on the provider customer and, when the
    /// subscriber found that way has no customer id yet, stores this one.
    pub async fn resolve_by_customer_id(
        &self,
        customer_id: &str,
    ) -> Result<Option<ResolvedSubscriber>> {
        if let Some(subscriber) = self.subscribers.get_by_stripe_customer_id(customer_id).await? {
            return Ok(Some(ResolvedSubscriber {
                subscriber,
                newly_linked: false,
            }));
        }

        let Some(reference) = self.provider.customer_subscriber_reference(customer_id).await?
        else {
            return Ok(None);
        };
        let Ok(subscriber_id) = Uuid::parse_str(&reference) else {
            warn!(customer_id, reference = %reference, "Customer metadata has invalid userId");
            return Ok(None);
        };
        let Some(mut subscriber) = self.subscribers.get_by_id(subscriber_id).await? else {
            return Ok(None);
        };

        let mut newly_linked = false;
        if subscriber.stripe_customer_id.is_none()
            && self
                .subscribers
                .link_customer(subscriber.id, customer_id)
                .await?
        {
            info!(
                subscriber_id = %subscriber.id,
                customer_id,
                "Linked provider customer to subscriber from customer metadata"
            );
            subscriber.stripe_customer_id = Some(customer_id.to_string());
            newly_linked = true;
        }

        Ok(Some(ResolvedSubscriber {
            subscriber,
            newly_linked,
        }))
    }

    /// Apply a `customer.subscription.*` event
    pub async fn apply_subscription(
        &self,
        subscription: &SubscriptionObject,
    ) -> Result<SubscriptionOutcome> {
        let customer_id = subscription.customer.id();
        let Some(resolved) = self.resolve_by_customer_id(customer_id).await? else {
            warn!(
                customer_id,
                subscription_id = %subscription.id,
                "No subscriber for subscription event"
            );
            return Ok(SubscriptionOutcome::Unresolved {
                customer_id: Some(customer_id.to_string()),
            });
        };

        let status = map_provider_status(subscription.status);
        // The customer link is written only by link_customer
        let changes = SubscriberBillingChanges {
            stripe_customer_id: None,
            stripe_subscription_id: Some(subscription.id.clone()),
            subscription_status: Some(status),
        };

        let subscriber_id = resolved.subscriber.id;
        if self
            .subscribers
            .update_billing(subscriber_id, changes)
            .await?
            .is_none()
        {
            warn!(%subscriber_id, "Subscriber disappeared before update");
            return Ok(SubscriptionOutcome::Unresolved {
                customer_id: Some(customer_id.to_string()),
            });
        }

        metrics::counter!("billing.subscription.reconciled").increment(1);
        info!(
            %subscriber_id,
            subscription_id = %subscription.id,
            provider_status = ?subscription.status,
            ?status,
            "Reconciled subscription"
        );
        Ok(SubscriptionOutcome::Updated {
            subscriber_id,
            status,
        })
    }

    /// Apply a completed subscription checkout: attach customer and subscription ids
    pub async fn apply_checkout(
        &self,
        session: &CheckoutSessionObject,
    ) -> Result<SubscriptionOutcome> {
        let customer_id = session.customer.as_ref().map(ObjectRef::id);
        let subscription_id = session.subscription.as_ref().map(ObjectRef::id);

        let by_reference = match session
            .metadata_value(metadata::USER_ID)
            .and_then(|id| Uuid::parse_str(id).ok())
        {
            Some(id) => self.subscribers.get_by_id(id).await?,
            None => None,
        };
        let subscriber = match (by_reference, customer_id) {
            (Some(subscriber), _) => Some(subscriber),
            (None, Some(customer_id)) => self
                .resolve_by_customer_id(customer_id)
                .await?
                .map(|resolved| resolved.subscriber),
            (None, None) => None,
        };

        let Some(subscriber) = subscriber else {
            warn!(session_id = %session.id, ?customer_id, "No subscriber for completed checkout");
            return Ok(SubscriptionOutcome::Unresolved {
                customer_id: customer_id.map(str::to_string),
            });
        };

        let changes = SubscriberBillingChanges {
            stripe_customer_id: customer_id.map(str::to_string),
            stripe_subscription_id: subscription_id.map(str::to_string),
            subscription_status: None,
        };
        if changes != SubscriberBillingChanges::default() {
            self.subscribers
                .update_billing(subscriber.id, changes)
                .await?;
        }

        info!(
            subscriber_id = %subscriber.id,
            session_id = %session.id,
            ?customer_id,
            ?subscription_id,
            "Linked checkout to subscriber"
        );
        Ok(SubscriptionOutcome::Linked {
            subscriber_id: subscriber.id,
        })
    }
}
