use std::time::Instant;

use tracing::{error, info, warn};

use super::dispatcher::{DispatchOutcome, WebhookDispatcher};
use super::error::WebhookError;
use super::signature::SignatureVerifier;

/// Acknowledgement for a verified delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookReceipt {
    pub event_id: String,
    pub event_type: String,
    /// `None` when processing failed after verification
    pub outcome: Option<DispatchOutcome>,
}

/// Verifies deliveries and hands them to the dispatcher.
///
/// Only verification failures are reported to the caller. Anything that goes
/// wrong after verification is logged and counted, and the delivery is still
/// acknowledged.
#[derive(Clone)]
pub struct WebhookService {
    inner: Option<(SignatureVerifier, WebhookDispatcher)>,
}

impl WebhookService {
    pub fn new(verifier: SignatureVerifier, dispatcher: WebhookDispatcher) -> Self {
        Self {
            inner: Some((verifier, dispatcher)),
        }
    }

    /// Rejects every delivery with [`WebhookError::NotConfigured`]
    pub fn unconfigured() -> Self {
        Self { inner: None }
    }

    pub async fn handle(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookReceipt, WebhookError> {
        let (verifier, dispatcher) = self.inner.as_ref().ok_or(WebhookError::NotConfigured)?;

        metrics::counter!("stripe.webhook.received").increment(1);
        let start = Instant::now();

        let Some(signature) = signature else {
            metrics::counter!("stripe.webhook.signature_invalid").increment(1);
            warn!("Webhook delivery without Stripe-Signature header");
            return Err(WebhookError::InvalidSignature(
                "missing Stripe-Signature header".to_string(),
            ));
        };

        let event = verifier.verify(payload, signature).inspect_err(|e| {
            metrics::counter!("stripe.webhook.signature_invalid").increment(1);
            warn!(error = %e, "Invalid webhook signature");
        })?;

        let outcome = match dispatcher.dispatch(&event).await {
            Ok(outcome) => {
                info!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    ?outcome,
                    "Processed webhook event"
                );
                Some(outcome)
            }
            Err(e) => {
                metrics::counter!("stripe.webhook.processing_errors").increment(1);
                error!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    error = %e,
                    "Failed to process webhook event"
                );
                None
            }
        };

        let duration_ms = start.elapsed().as_millis() as f64;
        metrics::histogram!("stripe.webhook.processing_ms").record(duration_ms);

        Ok(WebhookReceipt {
            event_id: event.id,
            event_type: event.event_type,
            outcome,
        })
    }
}
