use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_derive_enum::DbEnum;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Local two-state view of a coach's recurring billing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, DbEnum)]
#[db_enum(existing_type_path = "crate::schema::sql_types::SubscriptionStatus")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Inactive,
}

impl SubscriptionStatus {
    pub fn is_active(self) -> bool {
        self == SubscriptionStatus::Active
    }
}

/// API model for subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub is_admin: bool,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub subscription_status: SubscriptionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Diesel model for the subscribers table
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::subscribers)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SubscriberModel {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub is_admin: bool,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub subscription_status: SubscriptionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update of the provider links and status.
/// `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, AsChangeset)]
#[diesel(table_name = crate::schema::subscribers)]
pub struct SubscriberBillingChanges {
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub subscription_status: Option<SubscriptionStatus>,
}

impl SubscriberBillingChanges {
    pub fn status(status: SubscriptionStatus) -> Self {
        Self {
            subscription_status: Some(status),
            ..Default::default()
        }
    }

    /// Apply the same changes to an in-memory copy
    pub fn apply_to(&self, subscriber: &mut Subscriber) {
        if let Some(ref customer_id) = self.stripe_customer_id {
            subscriber.stripe_customer_id = Some(customer_id.clone());
        }
        if let Some(ref subscription_id) = self.stripe_subscription_id {
            subscriber.stripe_subscription_id = Some(subscription_id.clone());
        }
        if let Some(status) = self.subscription_status {
            subscriber.subscription_status = status;
        }
    }
}

impl From<SubscriberModel> for Subscriber {
    fn from(model: SubscriberModel) -> Self {
        Self {
            id: model.id,
            email: model.email,
            full_name: model.full_name,
            is_admin: model.is_admin,
            stripe_customer_id: model.stripe_customer_id,
            stripe_subscription_id: model.stripe_subscription_id,
            subscription_status: model.subscription_status,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}
