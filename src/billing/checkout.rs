use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::CheckoutError;
use super::metadata::{self, ShowcaseRegistrationMetadata};
use super::provider::{BillingProvider, ShowcaseCheckoutRequest, SubscriptionCheckoutRequest};
use super::status::PlanPrices;
use super::stores::{ShowcaseStore, SubscriberStore};
use crate::showcases::{RegistrationState, ShowcaseStatus};
use crate::subscribers::Subscriber;

pub const DEFAULT_WAIVER_VERSION: &str = "v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanChoice {
    Monthly,
    Annual,
}

impl FromStr for PlanChoice {
    type Err = CheckoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(PlanChoice::Monthly),
            "annual" => Ok(PlanChoice::Annual),
            other => Err(CheckoutError::InvalidPlan(other.to_string())),
        }
    }
}

/// What a purchaser submits to start a showcase checkout
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowcaseRegistrationRequest {
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub sport: Option<String>,
    #[serde(default)]
    pub waiver_version: Option<String>,
    #[serde(default)]
    pub refund_policy_version: Option<String>,
}

impl ShowcaseRegistrationRequest {
    fn validate(&self) -> Result<(), CheckoutError> {
        let name_len = self.full_name.trim().chars().count();
        if !(2..=120).contains(&name_len) {
            return Err(CheckoutError::InvalidRequest(
                "fullName must be 2 to 120 characters".to_string(),
            ));
        }
        let email = self.email.trim();
        let valid_email = email.len() <= 254
            && email
                .split_once('@')
                .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
        if !valid_email {
            return Err(CheckoutError::InvalidRequest(
                "email must be a valid address".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone)]
struct ProviderSettings {
    provider: Arc<dyn BillingProvider>,
    prices: PlanPrices,
    web_app_url: String,
}

/// Starts hosted checkout and portal sessions.
///
/// Also the producer side of the checkout metadata that the webhook
/// reconcilers consume.
#[derive(Clone)]
pub struct CheckoutService {
    subscribers: Arc<dyn SubscriberStore>,
    showcases: Arc<dyn ShowcaseStore>,
    settings: Option<ProviderSettings>,
}

impl CheckoutService {
    pub fn new(
        subscribers: Arc<dyn SubscriberStore>,
        showcases: Arc<dyn ShowcaseStore>,
        provider: Option<(Arc<dyn BillingProvider>, PlanPrices, String)>,
    ) -> Self {
        Self {
            subscribers,
            showcases,
            settings: provider.map(|(provider, prices, web_app_url)| ProviderSettings {
                provider,
                prices,
                web_app_url: web_app_url.trim_end_matches('/').to_string(),
            }),
        }
    }

    fn settings(&self) -> Result<&ProviderSettings, CheckoutError> {
        self.settings.as_ref().ok_or(CheckoutError::NotConfigured)
    }

    /// Return the subscriber's provider customer id, creating and storing one if needed
    pub async fn ensure_customer(&self, subscriber: &Subscriber) -> Result<String, CheckoutError> {
        if let Some(customer_id) = subscriber.stripe_customer_id.as_ref() {
            return Ok(customer_id.clone());
        }
        let settings = self.settings()?;

        let customer_id = settings
            .provider
            .create_customer(&subscriber.email, metadata::subscriber_metadata(subscriber.id))
            .await
            .map_err(CheckoutError::Provider)?;

        let linked = self
            .subscribers
            .link_customer(subscriber.id, &customer_id)
            .await
            .map_err(CheckoutError::Storage)?;
        if linked {
            info!(subscriber_id = %subscriber.id, %customer_id, "Created provider customer");
            return Ok(customer_id);
        }

        // Another request linked a customer first; use the stored one
        let current = self
            .subscribers
            .get_by_id(subscriber.id)
            .await
            .map_err(CheckoutError::Storage)?;
        Ok(current
            .and_then(|s| s.stripe_customer_id)
            .unwrap_or(customer_id))
    }

    pub async fn create_subscription_checkout(
        &self,
        subscriber: &Subscriber,
        plan: PlanChoice,
    ) -> Result<String, CheckoutError> {
        let settings = self.settings()?;
        let price_id = match plan {
            PlanChoice::Monthly => settings.prices.monthly.clone(),
            PlanChoice::Annual => settings.prices.annual.clone(),
        };
        let customer_id = self.ensure_customer(subscriber).await?;

        let request = SubscriptionCheckoutRequest {
            customer_id,
            price_id,
            success_url: format!("{}/coach/billing?success=1", settings.web_app_url),
            cancel_url: format!("{}/coach/billing?canceled=1", settings.web_app_url),
            metadata: metadata::subscriber_metadata(subscriber.id),
        };
        settings
            .provider
            .create_subscription_checkout(request)
            .await
            .map_err(CheckoutError::Provider)?
            .ok_or(CheckoutError::MissingCheckoutUrl)
    }

    pub async fn create_portal_session(
        &self,
        subscriber: &Subscriber,
    ) -> Result<String, CheckoutError> {
        let settings = self.settings()?;
        let customer_id = self.ensure_customer(subscriber).await?;
        if subscriber.stripe_subscription_id.is_none() {
            return Err(CheckoutError::NoSubscription);
        }

        settings
            .provider
            .create_portal_session(&customer_id, &format!("{}/coach/billing", settings.web_app_url))
            .await
            .map_err(CheckoutError::Provider)
    }

    pub async fn create_showcase_checkout(
        &self,
        showcase_key: &str,
        request: ShowcaseRegistrationRequest,
        purchaser: Option<&Subscriber>,
    ) -> Result<String, CheckoutError> {
        let settings = self.settings()?;

        let key = showcase_key.trim();
        let key = if uuid::Uuid::parse_str(key).is_ok() {
            key.to_string()
        } else {
            key.to_lowercase()
        };
        let showcase = self
            .showcases
            .get_by_id_or_slug(&key)
            .await
            .map_err(CheckoutError::Storage)?
            .filter(|s| s.status == ShowcaseStatus::Published)
            .ok_or(CheckoutError::ShowcaseNotFound)?;

        match showcase.registration_state(Utc::now()) {
            RegistrationState::Open => {}
            RegistrationState::Closed => return Err(CheckoutError::RegistrationClosed),
            RegistrationState::SoldOut => return Err(CheckoutError::SoldOut),
        }
        let price_id = showcase
            .stripe_price_id
            .clone()
            .ok_or(CheckoutError::ShowcasePriceMissing)?;

        request.validate()?;
        let email = purchaser
            .map(|p| p.email.clone())
            .unwrap_or_else(|| request.email.clone())
            .trim()
            .to_lowercase();
        let now = Utc::now();

        let details = ShowcaseRegistrationMetadata {
            showcase_id: showcase.id,
            showcase_slug: Some(showcase.slug.clone()),
            full_name: request.full_name.trim().to_string(),
            email: email.clone(),
            user_id: purchaser.map(|p| p.id),
            role: purchaser.map(account_role).or(request.role),
            sport: request.sport,
            waiver_accepted_at: Some(now),
            waiver_version: Some(
                request
                    .waiver_version
                    .unwrap_or_else(|| DEFAULT_WAIVER_VERSION.to_string()),
            ),
            refund_policy_accepted_at: request.refund_policy_version.as_ref().map(|_| now),
            refund_policy_version: request.refund_policy_version,
        };

        let showcase_url = format!("{}/showcases/{}", settings.web_app_url, showcase.slug);
        let checkout = ShowcaseCheckoutRequest {
            price_id,
            customer_email: email,
            success_url: format!("{showcase_url}?success=1&session_id={{CHECKOUT_SESSION_ID}}"),
            cancel_url: format!("{showcase_url}?canceled=1"),
            metadata: details.to_metadata(),
            allow_promotion_codes: true,
        };

        let url = settings
            .provider
            .create_showcase_checkout(checkout)
            .await
            .map_err(CheckoutError::Provider)?
            .ok_or(CheckoutError::MissingCheckoutUrl)?;
        info!(showcase_id = %showcase.id, "Started showcase checkout");
        Ok(url)
    }
}

/// Signed-in purchasers register under their account role, not the submitted one
fn account_role(subscriber: &Subscriber) -> String {
    if subscriber.is_admin {
        metadata::ADMIN_ROLE.to_string()
    } else {
        metadata::COACH_ROLE.to_string()
    }
}
