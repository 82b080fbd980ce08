use std::sync::OnceLock;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::{http::StatusCode, response::IntoResponse};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder and keep its handle for `/metrics`.
///
/// Calling this twice is an error; the recorder is process-global.
pub fn init_metrics() -> Result<()> {
    let handle = PrometheusBuilder::new()
        // Buckets: 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
        .set_buckets_for_metric(
            Matcher::Full("stripe.webhook.processing_ms".to_string()),
            &[
                5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0,
            ],
        )
        .context("failed to set buckets for stripe.webhook.processing_ms")?
        .install_recorder()
        .context("failed to install Prometheus recorder")?;

    METRICS_HANDLE
        .set(handle)
        .map_err(|_| anyhow::anyhow!("Metrics handle already initialized"))?;

    initialize_billing_metrics();
    Ok(())
}

/// Prometheus scrape endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    match METRICS_HANDLE.get() {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics recorder not installed".to_string(),
        ),
    }
}

/// Initialize billing metrics to zero so they always appear in Prometheus queries
pub fn initialize_billing_metrics() {
    // Webhook intake
    metrics::counter!("stripe.webhook.received").absolute(0);
    metrics::counter!("stripe.webhook.signature_invalid").absolute(0);
    metrics::counter!("stripe.webhook.processing_errors").absolute(0);

    // Showcase purchases
    metrics::counter!("billing.showcase.registered").absolute(0);
    metrics::counter!("billing.showcase.duplicate").absolute(0);
    metrics::counter!("billing.showcase.oversold").absolute(0);

    // Subscriptions
    metrics::counter!("billing.subscription.reconciled").absolute(0);
    metrics::counter!("billing.status.provider_errors").absolute(0);

    // Confirmation email
    metrics::counter!("billing.confirmation.sent").absolute(0);
    metrics::counter!("billing.confirmation.failed").absolute(0);
}

/// Background task to update process metrics
/// Updates uptime and memory usage metrics every 5 seconds
pub async fn process_metrics_task() {
    let start_time = Instant::now();

    loop {
        metrics::gauge!("process.uptime.seconds").set(start_time.elapsed().as_secs() as f64);
        metrics::gauge!("process.is_up").set(1.0);

        #[cfg(target_os = "linux")]
        {
            if let Ok(status) = std::fs::read_to_string("/proc/self/status")
                && let Some(kb) = status
                    .lines()
                    .find(|line| line.starts_with("VmRSS:"))
                    .and_then(|line| line.split_whitespace().nth(1))
                    .and_then(|kb| kb.parse::<f64>().ok())
            {
                metrics::gauge!("process.memory.bytes").set(kb * 1024.0);
            }
        }

        tokio::time::sleep(Duration::from_secs(5)).await;
    }
}
