//! Stripe webhook signature verification.
//!
//! The `Stripe-Signature` header has the form `t=<unix seconds>,v1=<hex>[,v1=<hex>...]`.
//! The signed payload is `"<t>.<raw body>"` under HMAC-SHA256 with the endpoint secret.
//! Verification runs on the raw request bytes, before any JSON parsing.

use std::time::Duration;

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::error::WebhookError;
use super::events::WebhookEvent;

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_TOLERANCE: Duration = Duration::from_secs(300);

#[derive(Clone)]
pub struct SignatureVerifier {
    secret: String,
    tolerance: Duration,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("secret", &"[REDACTED]")
            .field("tolerance", &self.tolerance)
            .finish()
    }
}

struct SignatureHeader<'a> {
    timestamp: i64,
    signatures: Vec<&'a str>,
}

fn parse_header(header: &str) -> Result<SignatureHeader<'_>, WebhookError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => {
                timestamp = Some(value.parse::<i64>().map_err(|_| {
                    WebhookError::InvalidSignature("malformed timestamp".to_string())
                })?)
            }
            "v1" => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| WebhookError::InvalidSignature("missing timestamp".to_string()))?;
    if signatures.is_empty() {
        return Err(WebhookError::InvalidSignature(
            "missing v1 signature".to_string(),
        ));
    }

    Ok(SignatureHeader {
        timestamp,
        signatures,
    })
}

impl SignatureVerifier {
    pub fn new(secret: impl Into<String>, tolerance: Duration) -> Self {
        Self {
            secret: secret.into(),
            tolerance,
        }
    }

    /// Verify the header against the raw body and decode the event envelope
    pub fn verify(&self, payload: &[u8], header: &str) -> Result<WebhookEvent, WebhookError> {
        self.verify_at(payload, header, Utc::now().timestamp())
    }

    fn verify_at(
        &self,
        payload: &[u8],
        header: &str,
        now: i64,
    ) -> Result<WebhookEvent, WebhookError> {
        let parsed = parse_header(header)?;

        let age = now.saturating_sub(parsed.timestamp).unsigned_abs();
        if age > self.tolerance.as_secs() {
            return Err(WebhookError::InvalidSignature(format!(
                "timestamp outside tolerance ({age}s)"
            )));
        }

        let matched = parsed.signatures.iter().any(|candidate| {
            let Ok(expected) = hex::decode(candidate) else {
                return false;
            };
            let Ok(mut mac) = HmacSha256::new_from_slice(self.secret.as_bytes()) else {
                return false;
            };
            mac.update(parsed.timestamp.to_string().as_bytes());
            mac.update(b".");
            mac.update(payload);
            mac.verify_slice(&expected).is_ok()
        });
        if !matched {
            return Err(WebhookError::InvalidSignature(
                "no matching signature".to_string(),
            ));
        }

        serde_json::from_slice(payload)
            .map_err(|e| WebhookError::InvalidSignature(format!("undecodable event: {e}")))
    }
}
