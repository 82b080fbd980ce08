//! Checkout session metadata contract.
//!
//! The producer (checkout creation) and the consumer (webhook reconciliation)
//! both go through this module so the key names live in one place.

use std::collections::HashMap;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub const KIND: &str = "kind";
pub const USER_ID: &str = "userId";
pub const ROLE: &str = "role";
pub const SHOWCASE_ID: &str = "showcaseId";
pub const SHOWCASE_SLUG: &str = "showcaseSlug";
pub const FULL_NAME: &str = "fullName";
pub const EMAIL: &str = "email";
pub const SPORT: &str = "sport";
pub const WAIVER_ACCEPTED_AT: &str = "waiverAcceptedAt";
pub const WAIVER_VERSION: &str = "waiverVersion";
pub const REFUND_POLICY_ACCEPTED_AT: &str = "refundPolicyAcceptedAt";
pub const REFUND_POLICY_VERSION: &str = "refundPolicyVersion";

pub const SHOWCASE_REGISTRATION_KIND: &str = "showcase_registration";
pub const COACH_ROLE: &str = "coach";
pub const ADMIN_ROLE: &str = "admin";

/// Which flow a completed checkout belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseKind {
    ShowcaseRegistration,
    Subscription,
}

impl PurchaseKind {
    pub fn from_kind(kind: Option<&str>) -> Self {
        match kind {
            Some(SHOWCASE_REGISTRATION_KIND) => PurchaseKind::ShowcaseRegistration,
            _ => PurchaseKind::Subscription,
        }
    }
}

/// Metadata attached to a subscription checkout, its subscription and its customer
pub fn subscriber_metadata(subscriber_id: Uuid) -> HashMap<String, String> {
    HashMap::from([
        (USER_ID.to_string(), subscriber_id.to_string()),
        (ROLE.to_string(), COACH_ROLE.to_string()),
    ])
}

/// Registration details carried through a one-time showcase checkout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShowcaseRegistrationMetadata {
    pub showcase_id: Uuid,
    pub showcase_slug: Option<String>,
    pub full_name: String,
    pub email: String,
    pub user_id: Option<Uuid>,
    pub role: Option<String>,
    pub sport: Option<String>,
    pub waiver_accepted_at: Option<DateTime<Utc>>,
    pub waiver_version: Option<String>,
    pub refund_policy_accepted_at: Option<DateTime<Utc>>,
    pub refund_policy_version: Option<String>,
}

fn parse_time(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|t| t.with_timezone(&Utc))
}

impl ShowcaseRegistrationMetadata {
    /// Parse from session metadata.
    ///
    /// `showcaseId`, `fullName` and `email` are required; optional values that
    /// fail to parse are dropped.
    pub fn parse(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let showcase_id = get(SHOWCASE_ID).ok_or_else(|| anyhow!("missing {SHOWCASE_ID}"))?;
        let showcase_id = Uuid::parse_str(&showcase_id)
            .map_err(|e| anyhow!("invalid {SHOWCASE_ID} {showcase_id:?}: {e}"))?;
        let full_name = get(FULL_NAME).ok_or_else(|| anyhow!("missing {FULL_NAME}"))?;
        let email = get(EMAIL).ok_or_else(|| anyhow!("missing {EMAIL}"))?;

        Ok(Self {
            showcase_id,
            showcase_slug: get(SHOWCASE_SLUG),
            full_name,
            email,
            user_id: get(USER_ID).and_then(|id| Uuid::parse_str(&id).ok()),
            role: get(ROLE),
            sport: get(SPORT),
            waiver_accepted_at: parse_time(get(WAIVER_ACCEPTED_AT).as_deref()),
            waiver_version: get(WAIVER_VERSION),
            refund_policy_accepted_at: parse_time(get(REFUND_POLICY_ACCEPTED_AT).as_deref()),
            refund_policy_version: get(REFUND_POLICY_VERSION),
        })
    }

    pub fn to_metadata(&self) -> HashMap<String, String> {
        let mut metadata = HashMap::from([
            (KIND.to_string(), SHOWCASE_REGISTRATION_KIND.to_string()),
            (SHOWCASE_ID.to_string(), self.showcase_id.to_string()),
            (FULL_NAME.to_string(), self.full_name.clone()),
            (EMAIL.to_string(), self.email.clone()),
        ]);

        let optional = [
            (SHOWCASE_SLUG, self.showcase_slug.clone()),
            (USER_ID, self.user_id.map(|id| id.to_string())),
            (ROLE, self.role.clone()),
            (SPORT, self.sport.clone()),
            (WAIVER_ACCEPTED_AT, self.waiver_accepted_at.map(|t| t.to_rfc3339())),
            (WAIVER_VERSION, self.waiver_version.clone()),
            (
                REFUND_POLICY_ACCEPTED_AT,
                self.refund_policy_accepted_at.map(|t| t.to_rfc3339()),
            ),
            (REFUND_POLICY_VERSION, self.refund_policy_version.clone()),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                metadata.insert(key.to_string(), value);
            }
        }
        metadata
    }
}
