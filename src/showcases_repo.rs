use anyhow::Result;
use async_trait::async_trait;
use diesel::prelude::*;
use tracing::debug;
use uuid::Uuid;

use crate::billing::{ShowcaseStore, SpotClaim};
use crate::showcases::{SeatLimit, Showcase, ShowcaseModel};
use crate::web::PgPool;

#[derive(Clone)]
pub struct ShowcasesRepository {
    pool: PgPool,
}

impl ShowcasesRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Showcase>> {
        use crate::schema::showcases::dsl;

        let pool = self.pool.clone();
        let slug = slug.to_string();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;

            let showcase: Option<ShowcaseModel> = dsl::showcases
                .filter(dsl::slug.eq(&slug))
                .select(ShowcaseModel::as_select())
                .first(&mut conn)
                .optional()?;

            Ok::<Option<ShowcaseModel>, anyhow::Error>(showcase)
        })
        .await??;

        Ok(result.map(|model| model.into()))
    }
}

#[async_trait]
impl ShowcaseStore for ShowcasesRepository {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Showcase>> {
        use crate::schema::showcases::dsl;

        let pool = self.pool.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;

            let showcase: Option<ShowcaseModel> = dsl::showcases
                .filter(dsl::id.eq(id))
                .select(ShowcaseModel::as_select())
                .first(&mut conn)
                .optional()?;

            Ok::<Option<ShowcaseModel>, anyhow::Error>(showcase)
        })
        .await??;

        Ok(result.map(|model| model.into()))
    }

    async fn get_by_id_or_slug(&self, key: &str) -> Result<Option<Showcase>> {
        match Uuid::parse_str(key) {
            Ok(id) => self.get_by_id(id).await,
            Err(_) => self.get_by_slug(key).await,
        }
    }

    async fn claim_spot(&self, showcase_id: Uuid, limit: &SeatLimit) -> Result<SpotClaim> {
        use crate::schema::showcases::dsl;

        let pool = self.pool.clone();
        let remaining = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;

            // Conditional decrement: the WHERE clause and SET run as one statement
            let remaining: Option<Option<i32>> = diesel::update(dsl::showcases)
                .filter(dsl::id.eq(showcase_id))
                .filter(dsl::spots_remaining.gt(0))
                .set((
                    dsl::spots_remaining.eq(dsl::spots_remaining - 1),
                    dsl::updated_at.eq(diesel::dsl::now),
                ))
                .returning(dsl::spots_remaining)
                .get_result(&mut conn)
                .optional()?;

            Ok::<Option<Option<i32>>, anyhow::Error>(remaining)
        })
        .await??;

        let claim = match remaining {
            Some(remaining) => SpotClaim::Claimed {
                remaining: remaining.unwrap_or(0),
            },
            None => SpotClaim::Exhausted,
        };
        debug!(
            showcase_id = %showcase_id,
            capacity = limit.capacity,
            ?claim,
            "Showcase spot claim"
        );
        Ok(claim)
    }
}
