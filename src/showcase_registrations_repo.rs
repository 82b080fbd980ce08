use anyhow::Result;
use async_trait::async_trait;
use diesel::prelude::*;

use crate::billing::RegistrationStore;
use crate::showcase_registrations::{
    NewShowcaseRegistration, RegistrationInsert, ShowcaseRegistration, ShowcaseRegistrationModel,
};
use crate::web::PgPool;

#[derive(Clone)]
pub struct ShowcaseRegistrationsRepository {
    pool: PgPool,
}

impl ShowcaseRegistrationsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RegistrationStore for ShowcaseRegistrationsRepository {
    async fn get_by_checkout_session_id(
        &self,
        session_id: &str,
    ) -> Result<Option<ShowcaseRegistration>> {
        use crate::schema::showcase_registrations::dsl;

        let pool = self.pool.clone();
        let session_id = session_id.to_string();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;

            let registration: Option<ShowcaseRegistrationModel> = dsl::showcase_registrations
                .filter(dsl::stripe_checkout_session_id.eq(&session_id))
                .select(ShowcaseRegistrationModel::as_select())
                .first(&mut conn)
                .optional()?;

            Ok::<Option<ShowcaseRegistrationModel>, anyhow::Error>(registration)
        })
        .await??;

        Ok(result.map(|model| model.into()))
    }

    async fn create_if_absent(
        &self,
        registration: NewShowcaseRegistration,
    ) -> Result<RegistrationInsert> {
        use crate::schema::showcase_registrations::dsl;

        let pool = self.pool.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;

            // The unique constraint on the session id arbitrates concurrent deliveries
            let inserted: Option<ShowcaseRegistrationModel> =
                diesel::insert_into(dsl::showcase_registrations)
                    .values(&registration)
                    .on_conflict(dsl::stripe_checkout_session_id)
                    .do_nothing()
                    .returning(ShowcaseRegistrationModel::as_returning())
                    .get_result(&mut conn)
                    .optional()?;

            Ok::<Option<ShowcaseRegistrationModel>, anyhow::Error>(inserted)
        })
        .await??;

        Ok(match result {
            Some(model) => RegistrationInsert::Created(model.into()),
            None => RegistrationInsert::AlreadyExists,
        })
    }
}
