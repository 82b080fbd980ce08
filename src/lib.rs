//! talent-billing: payment-event reconciliation for the talent platform.
//!
//! Verifies Stripe webhooks and turns them into local state: showcase seat
//! registrations for one-time purchases, and subscription status for coaches.
//! Also serves the billing endpoints that start those purchases.

pub mod actions;
pub mod auth;
pub mod billing;
pub mod email;
pub mod log_format;
pub mod metrics;
pub mod schema;
pub mod showcase_registrations;
pub mod showcase_registrations_repo;
pub mod showcases;
pub mod showcases_repo;
pub mod stripe_client;
pub mod subscribers;
pub mod subscribers_repo;
pub mod web;

pub use web::{AppState, BillingSettings, PgPool, Stores, router};
