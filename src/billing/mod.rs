//! Payment-event reconciliation.
//!
//! Incoming provider webhooks are verified ([`signature`]), decoded
//! ([`events`]) and routed by [`dispatcher::WebhookDispatcher`] either to the
//! one-time showcase purchase path ([`registrations`]) or to the recurring
//! subscription path ([`subscriptions`]). [`status`] answers billing-status
//! queries against the provider's live state, and [`checkout`] starts the
//! hosted sessions whose completion produces those webhooks.
//!
//! Storage and the provider are reached through the traits in [`stores`] and
//! [`provider`], so every component here can run against in-memory fakes.

pub mod checkout;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod metadata;
pub mod notifications;
pub mod provider;
pub mod registrations;
pub mod signature;
pub mod status;
pub mod stores;
pub mod subscriptions;
pub mod webhooks;

pub use checkout::{CheckoutService, PlanChoice, ShowcaseRegistrationRequest};
pub use dispatcher::{DispatchOutcome, WebhookDispatcher};
pub use error::{CheckoutError, WebhookError};
pub use events::WebhookEvent;
pub use notifications::{
    ConfirmationDispatcher, ConfirmationSender, NotificationOutcome, ShowcaseConfirmation,
};
pub use provider::{
    BillingInterval, BillingProvider, ProviderSubscription, ProviderSubscriptionStatus,
    ShowcaseCheckoutRequest, SubscriptionCheckoutRequest,
};
pub use registrations::{PurchaseOutcome, ShowcasePurchaseReconciler};
pub use signature::SignatureVerifier;
pub use status::{BillingStatus, BillingStatusResolver, PlanLabel, PlanPrices};
pub use stores::{RegistrationStore, ShowcaseStore, SpotClaim, SubscriberStore};
pub use subscriptions::{
    ResolvedSubscriber, SubscriptionOutcome, SubscriptionReconciler, map_provider_status,
};
pub use webhooks::{WebhookReceipt, WebhookService};
