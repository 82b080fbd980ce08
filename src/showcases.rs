use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_derive_enum::DbEnum;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, DbEnum)]
#[db_enum(existing_type_path = "crate::schema::sql_types::ShowcaseStatus")]
#[serde(rename_all = "snake_case")]
pub enum ShowcaseStatus {
    Draft,
    Published,
    Archived,
}

/// Seat counters for a capacity-limited showcase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatLimit {
    pub capacity: i32,
    pub remaining: i32,
}

/// Capacity is either absent entirely or a (capacity, remaining) pair.
/// A half-configured row is treated as unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Capacity {
    Unlimited,
    Limited(SeatLimit),
}

impl Capacity {
    pub fn from_columns(capacity: Option<i32>, spots_remaining: Option<i32>) -> Self {
        match (capacity, spots_remaining) {
            (Some(capacity), Some(remaining)) => Capacity::Limited(SeatLimit {
                capacity,
                remaining,
            }),
            _ => Capacity::Unlimited,
        }
    }

    pub fn is_sold_out(&self) -> bool {
        matches!(self, Capacity::Limited(limit) if limit.remaining <= 0)
    }
}

/// Whether new checkouts may be started for a showcase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationState {
    Open,
    Closed,
    SoldOut,
}

/// API model for showcases
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Showcase {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub start_date_time: Option<DateTime<Utc>>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub status: ShowcaseStatus,
    pub registration_open: bool,
    pub registration_open_at: Option<DateTime<Utc>>,
    pub registration_close_at: Option<DateTime<Utc>>,
    pub stripe_price_id: Option<String>,
    pub capacity: Capacity,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Showcase {
    pub fn registration_state(&self, now: DateTime<Utc>) -> RegistrationState {
        if self.status != ShowcaseStatus::Published || !self.registration_open {
            return RegistrationState::Closed;
        }
        if self.registration_open_at.is_some_and(|open_at| now < open_at) {
            return RegistrationState::Closed;
        }
        if self.registration_close_at.is_some_and(|close_at| now > close_at) {
            return RegistrationState::Closed;
        }
        if self.capacity.is_sold_out() {
            return RegistrationState::SoldOut;
        }
        RegistrationState::Open
    }

    /// "City, ST" with whichever parts are present
    pub fn location(&self) -> Option<String> {
        let parts: Vec<&str> = [self.city.as_deref(), self.state.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.trim().is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }
}

/// Diesel model for the showcases table
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::showcases)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ShowcaseModel {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub start_date_time: Option<DateTime<Utc>>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub status: ShowcaseStatus,
    pub registration_open: bool,
    pub registration_open_at: Option<DateTime<Utc>>,
    pub registration_close_at: Option<DateTime<Utc>>,
    pub stripe_price_id: Option<String>,
    pub capacity: Option<i32>,
    pub spots_remaining: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ShowcaseModel> for Showcase {
    fn from(model: ShowcaseModel) -> Self {
        Self {
            id: model.id,
            slug: model.slug,
            title: model.title,
            start_date_time: model.start_date_time,
            city: model.city,
            state: model.state,
            status: model.status,
            registration_open: model.registration_open,
            registration_open_at: model.registration_open_at,
            registration_close_at: model.registration_close_at,
            stripe_price_id: model.stripe_price_id,
            capacity: Capacity::from_columns(model.capacity, model.spots_remaining),
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}
