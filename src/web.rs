use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use axum::{
    Router,
    body::Body,
    http::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post, put},
};
use diesel::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use uuid::Uuid;

use crate::actions;
use crate::auth::JwtService;
use crate::billing::notifications::DEFAULT_SEND_TIMEOUT;
use crate::billing::status::DEFAULT_PROVIDER_TIMEOUT;
use crate::billing::{
    BillingProvider, BillingStatusResolver, CheckoutService, ConfirmationDispatcher,
    ConfirmationSender, PlanPrices, RegistrationStore, ShowcasePurchaseReconciler, ShowcaseStore,
    SignatureVerifier, SubscriberStore, SubscriptionReconciler, WebhookDispatcher, WebhookService,
};
use crate::showcase_registrations_repo::ShowcaseRegistrationsRepository;
use crate::showcases_repo::ShowcasesRepository;
use crate::stripe_client::{StripeBillingProvider, StripeConfig};
use crate::subscribers_repo::SubscribersRepository;

pub type PgPool = Pool<ConnectionManager<PgConnection>>;

/// Storage handles shared by every billing component
#[derive(Clone)]
pub struct Stores {
    pub subscribers: Arc<dyn SubscriberStore>,
    pub showcases: Arc<dyn ShowcaseStore>,
    pub registrations: Arc<dyn RegistrationStore>,
}

impl Stores {
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            subscribers: Arc::new(SubscribersRepository::new(pool.clone())),
            showcases: Arc::new(ShowcasesRepository::new(pool.clone())),
            registrations: Arc::new(ShowcaseRegistrationsRepository::new(pool)),
        }
    }
}

/// Everything needed to talk to the payment provider
#[derive(Clone)]
pub struct BillingSettings {
    pub provider: Arc<dyn BillingProvider>,
    pub webhook_secret: String,
    pub webhook_tolerance: std::time::Duration,
    pub prices: PlanPrices,
    pub web_app_url: String,
}

impl BillingSettings {
    pub fn from_stripe(config: &StripeConfig) -> Self {
        Self {
            provider: Arc::new(StripeBillingProvider::new(config)),
            webhook_secret: config.webhook_secret.clone(),
            webhook_tolerance: config.webhook_tolerance,
            prices: config.prices.clone(),
            web_app_url: config.web_app_url.clone(),
        }
    }
}

// App state shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub subscribers: Arc<dyn SubscriberStore>,
    pub webhooks: Arc<WebhookService>,
    pub billing_status: Arc<BillingStatusResolver>,
    pub checkout: Arc<CheckoutService>,
    pub jwt: Arc<JwtService>,
}

impl AppState {
    /// Wire the billing components together.
    ///
    /// Without `billing` every provider-backed endpoint reports not configured.
    pub fn new(
        stores: Stores,
        billing: Option<BillingSettings>,
        mailer: Option<Arc<dyn ConfirmationSender>>,
        jwt: Arc<JwtService>,
    ) -> Self {
        let webhooks = match billing.as_ref() {
            Some(settings) => {
                let notifications = ConfirmationDispatcher::new(
                    mailer,
                    settings.web_app_url.clone(),
                    DEFAULT_SEND_TIMEOUT,
                );
                let purchases = ShowcasePurchaseReconciler::new(
                    stores.showcases.clone(),
                    stores.registrations.clone(),
                    notifications,
                );
                let subscriptions = SubscriptionReconciler::new(
                    stores.subscribers.clone(),
                    settings.provider.clone(),
                );
                WebhookService::new(
                    SignatureVerifier::new(
                        settings.webhook_secret.clone(),
                        settings.webhook_tolerance,
                    ),
                    WebhookDispatcher::new(purchases, subscriptions),
                )
            }
            None => WebhookService::unconfigured(),
        };

        let billing_status = BillingStatusResolver::new(
            stores.subscribers.clone(),
            billing
                .as_ref()
                .map(|s| (s.provider.clone(), s.prices.clone())),
            DEFAULT_PROVIDER_TIMEOUT,
        );

        let checkout = CheckoutService::new(
            stores.subscribers.clone(),
            stores.showcases.clone(),
            billing.map(|s| (s.provider, s.prices, s.web_app_url)),
        );

        Self {
            subscribers: stores.subscribers,
            webhooks: Arc::new(webhooks),
            billing_status: Arc::new(billing_status),
            checkout: Arc::new(checkout),
            jwt,
        }
    }

    pub fn from_pool(
        pool: PgPool,
        stripe: Option<&StripeConfig>,
        mailer: Option<Arc<dyn ConfirmationSender>>,
        jwt_secret: &str,
    ) -> Self {
        Self::new(
            Stores::from_pool(pool),
            stripe.map(BillingSettings::from_stripe),
            mailer,
            Arc::new(JwtService::new(jwt_secret)),
        )
    }
}

// Middleware for request logging with correlation ID
async fn request_logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = Uuid::new_v4().to_string()[..8].to_string();
    let start_time = Instant::now();

    info!("Started {} {} [{}]", method, path, request_id);

    let response = next.run(request).await;
    let duration = start_time.elapsed();
    let status = response.status();

    info!(
        "Completed {} {} [{}] {} in {:.2}ms",
        method,
        path,
        request_id,
        status.as_u16(),
        duration.as_secs_f64() * 1000.0
    );

    response
}

// Middleware to capture HTTP errors to Sentry
async fn sentry_error_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;

    if response.status().is_server_error() {
        let status = response.status();
        error!("HTTP {} error on {} {}", status.as_u16(), method, uri);

        sentry::configure_scope(|scope| {
            scope.set_tag("http.method", method.as_str());
            scope.set_tag("http.url", uri.to_string());
            scope.set_tag("http.status_code", status.as_u16().to_string());
        });

        sentry::capture_message(
            &format!("HTTP {} error on {} {}", status.as_u16(), method, uri),
            sentry::Level::Error,
        );
    }

    response
}

/// All routes with their middleware, ready to serve or to drive in tests
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/stripe/webhooks", post(actions::handle_stripe_webhook))
        .route("/billing/status", get(actions::get_billing_status))
        .route("/billing/checkout", post(actions::create_billing_checkout))
        .route("/billing/portal", post(actions::create_billing_portal))
        .route(
            "/showcases/{id_or_slug}/register",
            post(actions::register_for_showcase),
        )
        .route(
            "/admin/subscribers/{id}/subscription-status",
            put(actions::set_subscription_status),
        )
        .route("/health", get(actions::health))
        .route("/metrics", get(crate::metrics::metrics_handler))
        .with_state(state)
        .layer(middleware::from_fn(request_logging_middleware))
        .layer(middleware::from_fn(sentry_error_middleware))
        .layer(CorsLayer::permissive())
}

pub async fn start_web_server(interface: String, port: u16, state: AppState) -> Result<()> {
    sentry::configure_scope(|scope| {
        scope.set_tag("operation", "web-server");
    });
    info!("Starting web server on {}:{}", interface, port);

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", interface, port)).await?;
    info!("Web server listening on http://{}:{}", interface, port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Web server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
