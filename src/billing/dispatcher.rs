use anyhow::Result;
use tracing::debug;

use super::events::{EventPayload, SubscriptionEventKind, WebhookEvent};
use super::metadata::{self, PurchaseKind};
use super::registrations::{PurchaseOutcome, ShowcasePurchaseReconciler};
use super::subscriptions::{SubscriptionOutcome, SubscriptionReconciler};

/// What a verified event led to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    ShowcasePurchase(PurchaseOutcome),
    Subscription(SubscriptionOutcome),
    /// Event type this service does not act on
    Ignored(String),
}

/// Routes verified events to the reconciler that owns them
#[derive(Clone)]
pub struct WebhookDispatcher {
    purchases: ShowcasePurchaseReconciler,
    subscriptions: SubscriptionReconciler,
}

impl WebhookDispatcher {
    pub fn new(purchases: ShowcasePurchaseReconciler, subscriptions: SubscriptionReconciler) -> Self {
        Self {
            purchases,
            subscriptions,
        }
    }

    pub async fn dispatch(&self, event: &WebhookEvent) -> Result<DispatchOutcome> {
        match event.payload()? {
            EventPayload::CheckoutSessionCompleted(session) => {
                match PurchaseKind::from_kind(session.metadata_value(metadata::KIND)) {
                    PurchaseKind::ShowcaseRegistration => Ok(DispatchOutcome::ShowcasePurchase(
                        self.purchases.apply(&session).await?,
                    )),
                    PurchaseKind::Subscription => Ok(DispatchOutcome::Subscription(
                        self.subscriptions.apply_checkout(&session).await?,
                    )),
                }
            }
            EventPayload::SubscriptionChanged { kind, subscription } => {
                if kind == SubscriptionEventKind::Deleted {
                    debug!(subscription_id = %subscription.id, "Subscription deleted");
                }
                Ok(DispatchOutcome::Subscription(
                    self.subscriptions.apply_subscription(&subscription).await?,
                ))
            }
            EventPayload::Unhandled => {
                debug!(event_id = %event.id, event_type = %event.event_type, "Ignoring webhook event");
                Ok(DispatchOutcome::Ignored(event.event_type.clone()))
            }
        }
    }
}
