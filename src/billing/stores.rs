use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::showcase_registrations::{
    NewShowcaseRegistration, RegistrationInsert, ShowcaseRegistration,
};
use crate::showcases::{SeatLimit, Showcase};
use crate::subscribers::{Subscriber, SubscriberBillingChanges};

/// Outcome of an attempt to take one seat from a limited showcase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpotClaim {
    Claimed { remaining: i32 },
    Exhausted,
}

/// Persistence for coach accounts and their provider links
#[async_trait]
pub trait SubscriberStore: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Subscriber>>;

    async fn get_by_stripe_customer_id(&self, customer_id: &str) -> Result<Option<Subscriber>>;

    /// Record the provider customer id, but only when none is stored yet.
    ///
    /// Returns `true` when this call wrote the link.
    async fn link_customer(&self, id: Uuid, customer_id: &str) -> Result<bool>;

    /// Apply the given changes and return the updated row, or `None` if the
    /// subscriber no longer exists
    async fn update_billing(
        &self,
        id: Uuid,
        changes: SubscriberBillingChanges,
    ) -> Result<Option<Subscriber>>;
}

/// Read access to showcases plus the atomic seat decrement
#[async_trait]
pub trait ShowcaseStore: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Showcase>>;

    /// Look up by UUID when the key parses as one, otherwise by slug
    async fn get_by_id_or_slug(&self, key: &str) -> Result<Option<Showcase>>;

    /// Decrement the remaining-seat counter if and only if it is above zero.
    ///
    /// Implementations must perform the check and the decrement as one atomic
    /// step so concurrent claims never drive the counter negative.
    async fn claim_spot(&self, showcase_id: Uuid, limit: &SeatLimit) -> Result<SpotClaim>;
}

/// Registrations keyed uniquely by checkout session id
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    async fn get_by_checkout_session_id(
        &self,
        session_id: &str,
    ) -> Result<Option<ShowcaseRegistration>>;

    /// Insert unless a registration for the same checkout session exists.
    ///
    /// The uniqueness check is enforced by the store, so two concurrent
    /// callers with the same session id see exactly one `Created`.
    async fn create_if_absent(
        &self,
        registration: NewShowcaseRegistration,
    ) -> Result<RegistrationInsert>;
}
