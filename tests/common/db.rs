//! Throwaway Postgres databases for repository tests
//!
//! Each `TestDatabase` creates `talent_billing_test_<random>` next to the
//! database named in `TEST_DATABASE_URL`, runs the embedded migrations on it and
//! drops it again when the value goes out of scope.

use anyhow::{Context, Result};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};

use talent_billing::PgPool;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/");

pub struct TestDatabase {
    db_name: String,
    pool: PgPool,
    admin_url: String,
}

/// Replace the database name (last path segment) of a connection url
fn with_database(url: &str, db_name: &str) -> String {
    match url.rsplit_once('/') {
        Some((base, _)) => format!("{base}/{db_name}"),
        None => url.to_string(),
    }
}

impl TestDatabase {
    pub async fn new() -> Result<Self> {
        dotenvy::dotenv().ok();
        let base_url = std::env::var("TEST_DATABASE_URL")
            .unwrap_or_else(|_| "postgresql://localhost/talent_billing_test".to_string());

        let db_name = format!("talent_billing_test_{}", uuid::Uuid::new_v4().simple());
        let admin_url = with_database(&base_url, "postgres");
        let test_url = with_database(&base_url, &db_name);

        let pool = {
            let admin_url = admin_url.clone();
            let db_name = db_name.clone();
            tokio::task::spawn_blocking(move || {
                let mut admin = PgConnection::establish(&admin_url)
                    .context("Failed to connect to PostgreSQL. Is it running?")?;
                // db_name is generated from a uuid, safe to interpolate
                diesel::sql_query(format!("CREATE DATABASE \"{db_name}\""))
                    .execute(&mut admin)
                    .with_context(|| format!("Failed to create database {db_name}"))?;

                let pool = Pool::builder()
                    .max_size(10)
                    .build(ConnectionManager::<PgConnection>::new(&test_url))
                    .with_context(|| format!("Failed to create connection pool for {db_name}"))?;
                pool.get()?
                    .run_pending_migrations(MIGRATIONS)
                    .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;
                Ok::<PgPool, anyhow::Error>(pool)
            })
            .await??
        };

        Ok(Self {
            db_name,
            pool,
            admin_url,
        })
    }

    pub fn pool(&self) -> PgPool {
        self.pool.clone()
    }
}

impl Drop for TestDatabase {
    fn drop(&mut self) {
        if let Ok(mut admin) = PgConnection::establish(&self.admin_url) {
            let _ = diesel::sql_query(format!(
                "DROP DATABASE IF EXISTS \"{}\" WITH (FORCE)",
                self.db_name
            ))
            .execute(&mut admin);
        }
    }
}
