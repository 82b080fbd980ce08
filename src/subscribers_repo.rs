use anyhow::Result;
use async_trait::async_trait;
use diesel::prelude::*;
use uuid::Uuid;

use crate::billing::SubscriberStore;
use crate::subscribers::{Subscriber, SubscriberBillingChanges, SubscriberModel};
use crate::web::PgPool;

#[derive(Clone)]
pub struct SubscribersRepository {
    pool: PgPool,
}

impl SubscribersRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriberStore for SubscribersRepository {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Subscriber>> {
        use crate::schema::subscribers::dsl;

        let pool = self.pool.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;

            let subscriber: Option<SubscriberModel> = dsl::subscribers
                .filter(dsl::id.eq(id))
                .select(SubscriberModel::as_select())
                .first(&mut conn)
                .optional()?;

            Ok::<Option<SubscriberModel>, anyhow::Error>(subscriber)
        })
        .await??;

        Ok(result.map(|model| model.into()))
    }

    async fn get_by_stripe_customer_id(&self, customer_id: &str) -> Result<Option<Subscriber>> {
        use crate::schema::subscribers::dsl;

        let pool = self.pool.clone();
        let customer_id = customer_id.to_string();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;

            let subscriber: Option<SubscriberModel> = dsl::subscribers
                .filter(dsl::stripe_customer_id.eq(&customer_id))
                .select(SubscriberModel::as_select())
                .first(&mut conn)
                .optional()?;

            Ok::<Option<SubscriberModel>, anyhow::Error>(subscriber)
        })
        .await??;

        Ok(result.map(|model| model.into()))
    }

    async fn link_customer(&self, id: Uuid, customer_id: &str) -> Result<bool> {
        use crate::schema::subscribers::dsl;

        let pool = self.pool.clone();
        let customer_id = customer_id.to_string();
        let updated = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;

            let rows = diesel::update(dsl::subscribers)
                .filter(dsl::id.eq(id))
                .filter(dsl::stripe_customer_id.is_null())
                .set((
                    dsl::stripe_customer_id.eq(Some(&customer_id)),
                    dsl::updated_at.eq(diesel::dsl::now),
                ))
                .execute(&mut conn)?;

            Ok::<usize, anyhow::Error>(rows)
        })
        .await??;

        Ok(updated == 1)
    }

    async fn update_billing(
        &self,
        id: Uuid,
        changes: SubscriberBillingChanges,
    ) -> Result<Option<Subscriber>> {
        use crate::schema::subscribers::dsl;

        let pool = self.pool.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;

            let updated: Option<SubscriberModel> = diesel::update(dsl::subscribers)
                .filter(dsl::id.eq(id))
                .set((&changes, dsl::updated_at.eq(diesel::dsl::now)))
                .returning(SubscriberModel::as_returning())
                .get_result(&mut conn)
                .optional()?;

            Ok::<Option<SubscriberModel>, anyhow::Error>(updated)
        })
        .await??;

        Ok(result.map(|model| model.into()))
    }
}
