use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::events::{CheckoutSessionObject, ObjectRef};
use super::metadata::ShowcaseRegistrationMetadata;
use super::notifications::{ConfirmationDispatcher, NotificationOutcome};
use super::stores::{RegistrationStore, ShowcaseStore, SpotClaim};
use crate::showcase_registrations::{
    NewShowcaseRegistration, RegistrationInsert, RegistrationPaymentStatus,
};
use crate::showcases::Capacity;

/// What applying a completed showcase checkout did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseOutcome {
    Registered {
        registration_id: Uuid,
        /// Seats left after this purchase, `None` for unlimited showcases
        spots_remaining: Option<i32>,
        notification: NotificationOutcome,
    },
    /// The checkout session was already applied
    Duplicate,
    ShowcaseNotFound {
        showcase_id: Uuid,
    },
    /// Paid registration recorded but no seat was left to allocate
    CapacityExhausted {
        registration_id: Uuid,
    },
}

/// Applies one-time showcase purchases exactly once per checkout session
#[derive(Clone)]
pub struct ShowcasePurchaseReconciler {
    showcases: Arc<dyn ShowcaseStore>,
    registrations: Arc<dyn RegistrationStore>,
    notifications: ConfirmationDispatcher,
}

impl ShowcasePurchaseReconciler {
    pub fn new(
        showcases: Arc<dyn ShowcaseStore>,
        registrations: Arc<dyn RegistrationStore>,
        notifications: ConfirmationDispatcher,
    ) -> Self {
        Self {
            showcases,
            registrations,
            notifications,
        }
    }

    pub async fn apply(&self, session: &CheckoutSessionObject) -> Result<PurchaseOutcome> {
        if self
            .registrations
            .get_by_checkout_session_id(&session.id)
            .await?
            .is_some()
        {
            metrics::counter!("billing.showcase.duplicate").increment(1);
            info!(session_id = %session.id, "Showcase checkout already applied");
            return Ok(PurchaseOutcome::Duplicate);
        }

        let details = ShowcaseRegistrationMetadata::parse(|key| {
            session.metadata_value(key).map(str::to_string)
        })
        .with_context(|| format!("showcase checkout {} has invalid metadata", session.id))?;

        let Some(showcase) = self.showcases.get_by_id(details.showcase_id).await? else {
            warn!(
                session_id = %session.id,
                showcase_id = %details.showcase_id,
                "Showcase for completed checkout not found"
            );
            return Ok(PurchaseOutcome::ShowcaseNotFound {
                showcase_id: details.showcase_id,
            });
        };

        let new_registration = NewShowcaseRegistration {
            showcase_id: showcase.id,
            user_id: details.user_id,
            full_name: details.full_name,
            email: details.email,
            role: details.role,
            sport: details.sport,
            waiver_accepted_at: details.waiver_accepted_at,
            waiver_version: details.waiver_version,
            refund_policy_accepted_at: details.refund_policy_accepted_at,
            refund_policy_version: details.refund_policy_version,
            payment_status: RegistrationPaymentStatus::Paid,
            stripe_checkout_session_id: session.id.clone(),
            stripe_payment_intent_id: session.payment_intent.as_ref().map(|r| r.id().to_string()),
        };

        let registration = match self.registrations.create_if_absent(new_registration).await? {
            RegistrationInsert::Created(registration) => registration,
            RegistrationInsert::AlreadyExists => {
                metrics::counter!("billing.showcase.duplicate").increment(1);
                info!(session_id = %session.id, "Concurrent delivery already applied checkout");
                return Ok(PurchaseOutcome::Duplicate);
            }
        };

        let spots_remaining = match showcase.capacity {
            Capacity::Unlimited => None,
            Capacity::Limited(ref limit) => {
                match self.showcases.claim_spot(showcase.id, limit).await? {
                    SpotClaim::Claimed { remaining } => Some(remaining),
                    SpotClaim::Exhausted => {
                        metrics::counter!("billing.showcase.oversold").increment(1);
                        error!(
                            session_id = %session.id,
                            showcase_id = %showcase.id,
                            registration_id = %registration.id,
                            customer = ?session.customer.as_ref().map(ObjectRef::id),
                            "Paid showcase registration has no seat left; needs manual review"
                        );
                        return Ok(PurchaseOutcome::CapacityExhausted {
                            registration_id: registration.id,
                        });
                    }
                }
            }
        };

        metrics::counter!("billing.showcase.registered").increment(1);
        info!(
            session_id = %session.id,
            showcase_id = %showcase.id,
            registration_id = %registration.id,
            ?spots_remaining,
            "Recorded showcase registration"
        );

        let confirmation = self.notifications.confirmation_for(&registration, &showcase);
        let notification = self.notifications.dispatch(confirmation).await;

        Ok(PurchaseOutcome::Registered {
            registration_id: registration.id,
            spots_remaining,
            notification,
        })
    }
}
