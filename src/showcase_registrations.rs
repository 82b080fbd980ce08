use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_derive_enum::DbEnum;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, DbEnum)]
#[db_enum(existing_type_path = "crate::schema::sql_types::RegistrationPaymentStatus")]
#[serde(rename_all = "snake_case")]
pub enum RegistrationPaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

/// API model for showcase registrations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowcaseRegistration {
    pub id: Uuid,
    pub showcase_id: Uuid,
    pub user_id: Option<Uuid>,
    pub full_name: String,
    pub email: String,
    pub role: Option<String>,
    pub sport: Option<String>,
    pub waiver_accepted_at: Option<DateTime<Utc>>,
    pub waiver_version: Option<String>,
    pub refund_policy_accepted_at: Option<DateTime<Utc>>,
    pub refund_policy_version: Option<String>,
    pub payment_status: RegistrationPaymentStatus,
    pub stripe_checkout_session_id: String,
    pub stripe_payment_intent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Diesel model for the showcase_registrations table
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::showcase_registrations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ShowcaseRegistrationModel {
    pub id: Uuid,
    pub showcase_id: Uuid,
    pub user_id: Option<Uuid>,
    pub full_name: String,
    pub email: String,
    pub role: Option<String>,
    pub sport: Option<String>,
    pub waiver_accepted_at: Option<DateTime<Utc>>,
    pub waiver_version: Option<String>,
    pub refund_policy_accepted_at: Option<DateTime<Utc>>,
    pub refund_policy_version: Option<String>,
    pub payment_status: RegistrationPaymentStatus,
    pub stripe_checkout_session_id: String,
    pub stripe_payment_intent_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert model for new registrations
#[derive(Debug, Clone, PartialEq, Eq, Insertable)]
#[diesel(table_name = crate::schema::showcase_registrations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NewShowcaseRegistration {
    pub showcase_id: Uuid,
    pub user_id: Option<Uuid>,
    pub full_name: String,
    pub email: String,
    pub role: Option<String>,
    pub sport: Option<String>,
    pub waiver_accepted_at: Option<DateTime<Utc>>,
    pub waiver_version: Option<String>,
    pub refund_policy_accepted_at: Option<DateTime<Utc>>,
    pub refund_policy_version: Option<String>,
    pub payment_status: RegistrationPaymentStatus,
    pub stripe_checkout_session_id: String,
    pub stripe_payment_intent_id: Option<String>,
}

/// Result of an insert keyed by checkout session id
#[derive(Debug, Clone)]
pub enum RegistrationInsert {
    Created(ShowcaseRegistration),
    AlreadyExists,
}

impl From<ShowcaseRegistrationModel> for ShowcaseRegistration {
    fn from(model: ShowcaseRegistrationModel) -> Self {
        Self {
            id: model.id,
            showcase_id: model.showcase_id,
            user_id: model.user_id,
            full_name: model.full_name,
            email: model.email,
            role: model.role,
            sport: model.sport,
            waiver_accepted_at: model.waiver_accepted_at,
            waiver_version: model.waiver_version,
            refund_policy_accepted_at: model.refund_policy_accepted_at,
            refund_policy_version: model.refund_policy_version,
            payment_status: model.payment_status,
            stripe_checkout_session_id: model.stripe_checkout_session_id,
            stripe_payment_intent_id: model.stripe_payment_intent_id,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}
