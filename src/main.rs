use std::io::IsTerminal;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use diesel::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use talent_billing::auth::get_jwt_secret;
use talent_billing::billing::ConfirmationSender;
use talent_billing::email::EmailService;
use talent_billing::log_format::TargetFirstFormat;
use talent_billing::stripe_client::StripeConfig;
use talent_billing::{AppState, PgPool, metrics, web};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[derive(Parser)]
#[command(name = "talent-billing")]
#[command(about = "Payment-event reconciliation and billing API")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the billing HTTP server
    Serve {
        /// Interface to bind to
        #[arg(long, default_value = "0.0.0.0")]
        interface: String,

        /// Port to listen on
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Apply pending database migrations and exit
    Migrate,
}

fn init_tracing(sentry_enabled: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .event_format(TargetFirstFormat::new(std::io::stdout().is_terminal()));

    let registry = tracing_subscriber::registry().with(filter).with(fmt_layer);
    if sentry_enabled {
        registry.with(sentry_tracing::layer()).init();
    } else {
        registry.init();
    }
}

fn init_sentry() -> Option<sentry::ClientInitGuard> {
    let dsn = std::env::var("SENTRY_DSN").ok().filter(|d| !d.is_empty())?;
    let environment = std::env::var("TALENT_ENV").unwrap_or_else(|_| "development".to_string());

    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: Some(environment.into()),
            attach_stacktrace: true,
            ..Default::default()
        },
    )))
}

fn create_pool() -> Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    Pool::builder()
        .max_size(20)
        .build(manager)
        .context("Failed to create database connection pool")
}

async fn run_migrations(pool: PgPool) -> Result<()> {
    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get()?;
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;
        for migration in &applied {
            info!("Applied migration {}", migration);
        }
        info!("Database migrations complete ({} applied)", applied.len());
        Ok::<(), anyhow::Error>(())
    })
    .await?
}

fn create_mailer() -> Option<Arc<dyn ConfirmationSender>> {
    match EmailService::new() {
        Ok(service) => Some(Arc::new(service)),
        Err(e) => {
            warn!(error = %e, "Email is not configured; showcase confirmations are disabled");
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let sentry_guard = init_sentry();
    init_tracing(sentry_guard.is_some());

    let cli = Cli::parse();
    let pool = create_pool()?;

    match cli.command {
        Commands::Migrate => run_migrations(pool).await,
        Commands::Serve { interface, port } => {
            run_migrations(pool.clone()).await?;

            metrics::init_metrics()?;
            tokio::spawn(metrics::process_metrics_task());

            let stripe = StripeConfig::from_env()?;
            let jwt_secret = get_jwt_secret()?;
            let state = AppState::from_pool(pool, stripe.as_ref(), create_mailer(), &jwt_secret);

            web::start_web_server(interface, port, state).await
        }
    }
}
