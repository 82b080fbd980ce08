use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::showcase_registrations::ShowcaseRegistration;
use crate::showcases::Showcase;

pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(15);

/// Everything needed to tell a purchaser their seat is confirmed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShowcaseConfirmation {
    pub to_email: String,
    pub full_name: String,
    pub showcase_title: String,
    pub starts_at: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub details_url: String,
}

/// Delivery channel for registration confirmations
#[async_trait]
pub trait ConfirmationSender: Send + Sync {
    async fn send_showcase_confirmation(&self, confirmation: &ShowcaseConfirmation) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationOutcome {
    Sent,
    Failed,
    TimedOut,
    /// No sender configured
    Disabled,
}

/// Fire-and-forget confirmation delivery.
///
/// Never fails: every delivery problem is logged, counted and folded into the
/// returned outcome.
#[derive(Clone)]
pub struct ConfirmationDispatcher {
    sender: Option<Arc<dyn ConfirmationSender>>,
    web_app_url: String,
    timeout: Duration,
}

impl ConfirmationDispatcher {
    pub fn new(
        sender: Option<Arc<dyn ConfirmationSender>>,
        web_app_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            sender,
            web_app_url: web_app_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn details_url(&self, showcase: &Showcase) -> String {
        format!("{}/showcases/{}", self.web_app_url, showcase.slug)
    }

    pub fn confirmation_for(
        &self,
        registration: &ShowcaseRegistration,
        showcase: &Showcase,
    ) -> ShowcaseConfirmation {
        ShowcaseConfirmation {
            to_email: registration.email.clone(),
            full_name: registration.full_name.clone(),
            showcase_title: showcase.title.clone(),
            starts_at: showcase.start_date_time,
            location: showcase.location(),
            details_url: self.details_url(showcase),
        }
    }

    pub async fn dispatch(&self, confirmation: ShowcaseConfirmation) -> NotificationOutcome {
        let Some(sender) = self.sender.as_ref() else {
            info!(
                to = %confirmation.to_email,
                "Email not configured, skipping showcase confirmation"
            );
            return NotificationOutcome::Disabled;
        };

        match tokio::time::timeout(
            self.timeout,
            sender.send_showcase_confirmation(&confirmation),
        )
        .await
        {
            Ok(Ok(())) => {
                metrics::counter!("billing.confirmation.sent").increment(1);
                info!(to = %confirmation.to_email, "Sent showcase confirmation");
                NotificationOutcome::Sent
            }
            Ok(Err(e)) => {
                metrics::counter!("billing.confirmation.failed").increment(1);
                warn!(error = %e, to = %confirmation.to_email, "Failed to send showcase confirmation");
                NotificationOutcome::Failed
            }
            Err(_) => {
                metrics::counter!("billing.confirmation.failed").increment(1);
                warn!(
                    to = %confirmation.to_email,
                    timeout_secs = self.timeout.as_secs(),
                    "Timed out sending showcase confirmation"
                );
                NotificationOutcome::TimedOut
            }
        }
    }
}
