//! Typed view over the webhook envelope.
//!
//! Only the fields the reconcilers read are decoded; everything else in the
//! provider payload is ignored.

use std::collections::HashMap;

use anyhow::{Context, Result};
use serde::Deserialize;

use super::provider::ProviderSubscriptionStatus;

pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";
pub const SUBSCRIPTION_CREATED: &str = "customer.subscription.created";
pub const SUBSCRIPTION_UPDATED: &str = "customer.subscription.updated";
pub const SUBSCRIPTION_DELETED: &str = "customer.subscription.deleted";

/// A verified webhook envelope
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

/// A reference that the provider sends either as a bare id or as an expanded object
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ObjectRef {
    Id(String),
    Object { id: String },
}

impl ObjectRef {
    pub fn id(&self) -> &str {
        match self {
            ObjectRef::Id(id) => id,
            ObjectRef::Object { id } => id,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSessionObject {
    pub id: String,
    #[serde(default)]
    pub customer: Option<ObjectRef>,
    #[serde(default)]
    pub subscription: Option<ObjectRef>,
    #[serde(default)]
    pub payment_intent: Option<ObjectRef>,
    #[serde(default)]
    metadata: Option<HashMap<String, String>>,
}

impl CheckoutSessionObject {
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|metadata| metadata.get(key))
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionObject {
    pub id: String,
    pub customer: ObjectRef,
    pub status: ProviderSubscriptionStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionEventKind {
    Created,
    Updated,
    Deleted,
}

/// Event classified by type with its object decoded
#[derive(Debug, Clone)]
pub enum EventPayload {
    CheckoutSessionCompleted(CheckoutSessionObject),
    SubscriptionChanged {
        kind: SubscriptionEventKind,
        subscription: SubscriptionObject,
    },
    Unhandled,
}

impl WebhookEvent {
    /// Decode `data.object` according to the event type.
    ///
    /// Unknown types are `Unhandled`, never an error. A known type whose object
    /// does not decode is an error.
    pub fn payload(&self) -> Result<EventPayload> {
        let kind = match self.event_type.as_str() {
            CHECKOUT_SESSION_COMPLETED => {
                let session: CheckoutSessionObject =
                    serde_json::from_value(self.data.object.clone())
                        .with_context(|| format!("decoding checkout session in {}", self.id))?;
                return Ok(EventPayload::CheckoutSessionCompleted(session));
            }
            SUBSCRIPTION_CREATED => SubscriptionEventKind::Created,
            SUBSCRIPTION_UPDATED => SubscriptionEventKind::Updated,
            SUBSCRIPTION_DELETED => SubscriptionEventKind::Deleted,
            _ => return Ok(EventPayload::Unhandled),
        };

        let subscription: SubscriptionObject = serde_json::from_value(self.data.object.clone())
            .with_context(|| format!("decoding subscription in {}", self.id))?;
        Ok(EventPayload::SubscriptionChanged { kind, subscription })
    }
}
