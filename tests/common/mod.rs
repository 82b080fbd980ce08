//! Shared fixtures for billing integration tests
//!
//! The in-memory stores below give the same guarantees the Postgres repositories
//! do: `create_if_absent` is unique on the checkout session id and `claim_spot`
//! checks and decrements under one lock. That lets the reconcilers, the webhook
//! service and the router run end to end without a database.

#![allow(dead_code)]

pub mod db;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::{Value, json};
use sha2::Sha256;
use uuid::Uuid;

use talent_billing::auth::JwtService;
use talent_billing::billing::notifications::DEFAULT_SEND_TIMEOUT;
use talent_billing::billing::signature::DEFAULT_TOLERANCE;
use talent_billing::billing::{
    BillingProvider, ConfirmationDispatcher, ConfirmationSender, PlanPrices, ProviderSubscription,
    RegistrationStore, ShowcaseCheckoutRequest, ShowcasePurchaseReconciler, ShowcaseStore,
    ShowcaseConfirmation, SignatureVerifier, SpotClaim, SubscriberStore,
    SubscriptionCheckoutRequest, SubscriptionReconciler, WebhookDispatcher, WebhookService,
};
use talent_billing::showcase_registrations::{
    NewShowcaseRegistration, RegistrationInsert, ShowcaseRegistration,
};
use talent_billing::showcases::{Capacity, SeatLimit, Showcase, ShowcaseStatus};
use talent_billing::subscribers::{Subscriber, SubscriberBillingChanges, SubscriptionStatus};
use talent_billing::{AppState, BillingSettings, Stores};

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const JWT_SECRET: &str = "test-jwt-secret";
pub const WEB_APP_URL: &str = "https://talent.example.com";
pub const MONTHLY_PRICE: &str = "price_monthly";
pub const ANNUAL_PRICE: &str = "price_annual";

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemorySubscribers {
    rows: Mutex<HashMap<Uuid, Subscriber>>,
    pub fail_updates: AtomicBool,
    /// Customer id another writer links first on the next `link_customer` call
    pub concurrent_link: Mutex<Option<String>>,
}

impl InMemorySubscribers {
    pub fn insert(&self, subscriber: Subscriber) {
        self.rows.lock().unwrap().insert(subscriber.id, subscriber);
    }

    pub fn get(&self, id: Uuid) -> Subscriber {
        self.rows.lock().unwrap().get(&id).cloned().expect("subscriber exists")
    }
}

#[async_trait]
impl SubscriberStore for InMemorySubscribers {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Subscriber>> {
        Ok(self.rows.lock().unwrap().get(&id).cloned())
    }

    async fn get_by_stripe_customer_id(&self, customer_id: &str) -> Result<Option<Subscriber>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .find(|s| s.stripe_customer_id.as_deref() == Some(customer_id))
            .cloned())
    }

    async fn link_customer(&self, id: Uuid, customer_id: &str) -> Result<bool> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(winner) = self.concurrent_link.lock().unwrap().take() {
            if let Some(subscriber) = rows.get_mut(&id) {
                subscriber.stripe_customer_id = Some(winner);
            }
            return Ok(false);
        }
        match rows.get_mut(&id) {
            Some(subscriber) if subscriber.stripe_customer_id.is_none() => {
                subscriber.stripe_customer_id = Some(customer_id.to_string());
                subscriber.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_billing(
        &self,
        id: Uuid,
        changes: SubscriberBillingChanges,
    ) -> Result<Option<Subscriber>> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(anyhow!("database unavailable"));
        }
        let mut rows = self.rows.lock().unwrap();
        Ok(rows.get_mut(&id).map(|subscriber| {
            changes.apply_to(subscriber);
            subscriber.updated_at = Utc::now();
            subscriber.clone()
        }))
    }
}

#[derive(Default)]
pub struct InMemoryShowcases {
    rows: Mutex<HashMap<Uuid, Showcase>>,
}

impl InMemoryShowcases {
    pub fn insert(&self, showcase: Showcase) {
        self.rows.lock().unwrap().insert(showcase.id, showcase);
    }

    pub fn get(&self, id: Uuid) -> Showcase {
        self.rows.lock().unwrap().get(&id).cloned().expect("showcase exists")
    }

    pub fn spots_remaining(&self, id: Uuid) -> Option<i32> {
        match self.get(id).capacity {
            Capacity::Limited(limit) => Some(limit.remaining),
            Capacity::Unlimited => None,
        }
    }
}

#[async_trait]
impl ShowcaseStore for InMemoryShowcases {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Showcase>> {
        Ok(self.rows.lock().unwrap().get(&id).cloned())
    }

    async fn get_by_id_or_slug(&self, key: &str) -> Result<Option<Showcase>> {
        let rows = self.rows.lock().unwrap();
        Ok(match Uuid::parse_str(key) {
            Ok(id) => rows.get(&id).cloned(),
            Err(_) => rows.values().find(|s| s.slug == key).cloned(),
        })
    }

    async fn claim_spot(&self, showcase_id: Uuid, _limit: &SeatLimit) -> Result<SpotClaim> {
        let mut rows = self.rows.lock().unwrap();
        let showcase = rows
            .get_mut(&showcase_id)
            .ok_or_else(|| anyhow!("showcase {showcase_id} not found"))?;
        match &mut showcase.capacity {
            Capacity::Limited(limit) if limit.remaining > 0 => {
                limit.remaining -= 1;
                Ok(SpotClaim::Claimed {
                    remaining: limit.remaining,
                })
            }
            _ => Ok(SpotClaim::Exhausted),
        }
    }
}

#[derive(Default)]
pub struct InMemoryRegistrations {
    rows: Mutex<Vec<ShowcaseRegistration>>,
}

impl InMemoryRegistrations {
    pub fn all(&self) -> Vec<ShowcaseRegistration> {
        self.rows.lock().unwrap().clone()
    }

    pub fn count_for_session(&self, session_id: &str) -> usize {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.stripe_checkout_session_id == session_id)
            .count()
    }
}

#[async_trait]
impl RegistrationStore for InMemoryRegistrations {
    async fn get_by_checkout_session_id(
        &self,
        session_id: &str,
    ) -> Result<Option<ShowcaseRegistration>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.stripe_checkout_session_id == session_id)
            .cloned())
    }

    async fn create_if_absent(
        &self,
        registration: NewShowcaseRegistration,
    ) -> Result<RegistrationInsert> {
        let mut rows = self.rows.lock().unwrap();
        if rows
            .iter()
            .any(|r| r.stripe_checkout_session_id == registration.stripe_checkout_session_id)
        {
            return Ok(RegistrationInsert::AlreadyExists);
        }
        let now = Utc::now();
        let created = ShowcaseRegistration {
            id: Uuid::new_v4(),
            showcase_id: registration.showcase_id,
            user_id: registration.user_id,
            full_name: registration.full_name,
            email: registration.email,
            role: registration.role,
            sport: registration.sport,
            waiver_accepted_at: registration.waiver_accepted_at,
            waiver_version: registration.waiver_version,
            refund_policy_accepted_at: registration.refund_policy_accepted_at,
            refund_policy_version: registration.refund_policy_version,
            payment_status: registration.payment_status,
            stripe_checkout_session_id: registration.stripe_checkout_session_id,
            stripe_payment_intent_id: registration.stripe_payment_intent_id,
            created_at: now,
            updated_at: now,
        };
        rows.push(created.clone());
        Ok(RegistrationInsert::Created(created))
    }
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Scripted provider: answers from in-memory maps, optionally slow or failing
#[derive(Default)]
pub struct FakeProvider {
    /// customer id -> `userId` metadata
    pub customer_references: Mutex<HashMap<String, String>>,
    /// customer id -> subscriptions
    pub subscriptions: Mutex<HashMap<String, Vec<ProviderSubscription>>>,
    pub delay: Mutex<Option<Duration>>,
    pub fail: AtomicBool,
    pub customers_created: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub subscription_checkouts: Mutex<Vec<SubscriptionCheckoutRequest>>,
    pub showcase_checkouts: Mutex<Vec<ShowcaseCheckoutRequest>>,
}

impl FakeProvider {
    pub fn set_customer_reference(&self, customer_id: &str, subscriber_id: Uuid) {
        self.customer_references
            .lock()
            .unwrap()
            .insert(customer_id.to_string(), subscriber_id.to_string());
    }

    pub fn set_subscriptions(&self, customer_id: &str, subscriptions: Vec<ProviderSubscription>) {
        self.subscriptions
            .lock()
            .unwrap()
            .insert(customer_id.to_string(), subscriptions);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    async fn maybe_wait_or_fail(&self) -> Result<()> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("provider unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl BillingProvider for FakeProvider {
    async fn customer_subscriber_reference(&self, customer_id: &str) -> Result<Option<String>> {
        self.maybe_wait_or_fail().await?;
        Ok(self
            .customer_references
            .lock()
            .unwrap()
            .get(customer_id)
            .cloned())
    }

    async fn list_subscriptions(&self, customer_id: &str) -> Result<Vec<ProviderSubscription>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.maybe_wait_or_fail().await?;
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .get(customer_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_customer(
        &self,
        _email: &str,
        metadata: HashMap<String, String>,
    ) -> Result<String> {
        self.maybe_wait_or_fail().await?;
        let n = self.customers_created.fetch_add(1, Ordering::SeqCst) + 1;
        let customer_id = format!("cus_created_{n}");
        if let Some(user_id) = metadata.get("userId") {
            self.customer_references
                .lock()
                .unwrap()
                .insert(customer_id.clone(), user_id.clone());
        }
        Ok(customer_id)
    }

    async fn create_subscription_checkout(
        &self,
        request: SubscriptionCheckoutRequest,
    ) -> Result<Option<String>> {
        self.maybe_wait_or_fail().await?;
        self.subscription_checkouts.lock().unwrap().push(request);
        Ok(Some("https://checkout.stripe.test/c/sub".to_string()))
    }

    async fn create_portal_session(&self, customer_id: &str, _return_url: &str) -> Result<String> {
        self.maybe_wait_or_fail().await?;
        Ok(format!("https://billing.stripe.test/p/{customer_id}"))
    }

    async fn create_showcase_checkout(
        &self,
        request: ShowcaseCheckoutRequest,
    ) -> Result<Option<String>> {
        self.maybe_wait_or_fail().await?;
        self.showcase_checkouts.lock().unwrap().push(request);
        Ok(Some("https://checkout.stripe.test/c/showcase".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Confirmation senders
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingSender {
    pub sent: Mutex<Vec<ShowcaseConfirmation>>,
}

impl RecordingSender {
    pub fn sent(&self) -> Vec<ShowcaseConfirmation> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConfirmationSender for RecordingSender {
    async fn send_showcase_confirmation(&self, confirmation: &ShowcaseConfirmation) -> Result<()> {
        self.sent.lock().unwrap().push(confirmation.clone());
        Ok(())
    }
}

pub struct FailingSender;

#[async_trait]
impl ConfirmationSender for FailingSender {
    async fn send_showcase_confirmation(&self, _confirmation: &ShowcaseConfirmation) -> Result<()> {
        Err(anyhow!("smtp connection refused"))
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn subscriber(email: &str) -> Subscriber {
    let now = Utc::now();
    Subscriber {
        id: Uuid::new_v4(),
        email: email.to_string(),
        full_name: Some("Casey Coach".to_string()),
        is_admin: false,
        stripe_customer_id: None,
        stripe_subscription_id: None,
        subscription_status: SubscriptionStatus::Inactive,
        created_at: now,
        updated_at: now,
    }
}

pub fn admin(email: &str) -> Subscriber {
    Subscriber {
        is_admin: true,
        ..subscriber(email)
    }
}

pub fn showcase(slug: &str, capacity: Capacity) -> Showcase {
    let now = Utc::now();
    Showcase {
        id: Uuid::new_v4(),
        slug: slug.to_string(),
        title: "Spring Elite Showcase".to_string(),
        start_date_time: Some(now + chrono::Duration::days(30)),
        city: Some("Austin".to_string()),
        state: Some("TX".to_string()),
        status: ShowcaseStatus::Published,
        registration_open: true,
        registration_open_at: None,
        registration_close_at: None,
        stripe_price_id: Some("price_showcase".to_string()),
        capacity,
        created_at: now,
        updated_at: now,
    }
}

pub fn limited(capacity: i32, remaining: i32) -> Capacity {
    Capacity::Limited(SeatLimit {
        capacity,
        remaining,
    })
}

pub fn prices() -> PlanPrices {
    PlanPrices {
        monthly: MONTHLY_PRICE.to_string(),
        annual: ANNUAL_PRICE.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Events and signatures
// ---------------------------------------------------------------------------

/// `Stripe-Signature` header value for a payload signed at `timestamp`
pub fn signature_header(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("hmac accepts any key");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    )
}

/// Signed with the test secret at the current time
pub fn sign(payload: &[u8]) -> String {
    signature_header(payload, WEBHOOK_SECRET, Utc::now().timestamp())
}

pub fn event(event_id: &str, event_type: &str, object: Value) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "id": event_id,
        "object": "event",
        "type": event_type,
        "created": Utc::now().timestamp(),
        "livemode": false,
        "data": { "object": object },
    }))
    .expect("event serializes")
}

/// Metadata a showcase checkout carries
pub fn showcase_metadata(showcase: &Showcase, full_name: &str, email: &str) -> Value {
    json!({
        "kind": "showcase_registration",
        "showcaseId": showcase.id.to_string(),
        "showcaseSlug": showcase.slug,
        "fullName": full_name,
        "email": email,
        "waiverVersion": "v1",
        "waiverAcceptedAt": Utc::now().to_rfc3339(),
    })
}

pub fn showcase_checkout_completed(event_id: &str, session_id: &str, metadata: Value) -> Vec<u8> {
    event(
        event_id,
        "checkout.session.completed",
        json!({
            "id": session_id,
            "object": "checkout.session",
            "mode": "payment",
            "customer": null,
            "payment_intent": "pi_123",
            "metadata": metadata,
        }),
    )
}

pub fn subscription_checkout_completed(
    event_id: &str,
    session_id: &str,
    customer_id: &str,
    subscription_id: &str,
    user_id: Option<Uuid>,
) -> Vec<u8> {
    let metadata = match user_id {
        Some(id) => json!({ "userId": id.to_string(), "role": "coach" }),
        None => json!({}),
    };
    event(
        event_id,
        "checkout.session.completed",
        json!({
            "id": session_id,
            "object": "checkout.session",
            "mode": "subscription",
            "customer": customer_id,
            "subscription": subscription_id,
            "metadata": metadata,
        }),
    )
}

pub fn subscription_event(
    event_id: &str,
    event_type: &str,
    subscription_id: &str,
    customer_id: &str,
    status: &str,
) -> Vec<u8> {
    event(
        event_id,
        event_type,
        json!({
            "id": subscription_id,
            "object": "subscription",
            "customer": customer_id,
            "status": status,
            "items": {
                "object": "list",
                "data": [{
                    "id": "si_1",
                    "price": {
                        "id": MONTHLY_PRICE,
                        "recurring": { "interval": "month" }
                    }
                }]
            }
        }),
    )
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// All fakes plus the components built on top of them
pub struct TestBilling {
    pub subscribers: Arc<InMemorySubscribers>,
    pub showcases: Arc<InMemoryShowcases>,
    pub registrations: Arc<InMemoryRegistrations>,
    pub provider: Arc<FakeProvider>,
    pub sender: Arc<RecordingSender>,
}

impl Default for TestBilling {
    fn default() -> Self {
        Self::new()
    }
}

impl TestBilling {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(InMemorySubscribers::default()),
            showcases: Arc::new(InMemoryShowcases::default()),
            registrations: Arc::new(InMemoryRegistrations::default()),
            provider: Arc::new(FakeProvider::default()),
            sender: Arc::new(RecordingSender::default()),
        }
    }

    pub fn confirmations(&self) -> ConfirmationDispatcher {
        ConfirmationDispatcher::new(
            Some(self.sender.clone() as Arc<dyn ConfirmationSender>),
            WEB_APP_URL,
            DEFAULT_SEND_TIMEOUT,
        )
    }

    pub fn purchases(&self) -> ShowcasePurchaseReconciler {
        ShowcasePurchaseReconciler::new(
            self.showcases.clone(),
            self.registrations.clone(),
            self.confirmations(),
        )
    }

    pub fn subscriptions(&self) -> SubscriptionReconciler {
        SubscriptionReconciler::new(self.subscribers.clone(), self.provider.clone())
    }

    pub fn webhooks(&self) -> WebhookService {
        WebhookService::new(
            SignatureVerifier::new(WEBHOOK_SECRET, DEFAULT_TOLERANCE),
            WebhookDispatcher::new(self.purchases(), self.subscriptions()),
        )
    }

    pub fn stores(&self) -> Stores {
        Stores {
            subscribers: self.subscribers.clone(),
            showcases: self.showcases.clone(),
            registrations: self.registrations.clone(),
        }
    }

    pub fn settings(&self) -> BillingSettings {
        BillingSettings {
            provider: self.provider.clone(),
            webhook_secret: WEBHOOK_SECRET.to_string(),
            webhook_tolerance: DEFAULT_TOLERANCE,
            prices: prices(),
            web_app_url: WEB_APP_URL.to_string(),
        }
    }

    pub fn app_state(&self) -> AppState {
        AppState::new(
            self.stores(),
            Some(self.settings()),
            Some(self.sender.clone() as Arc<dyn ConfirmationSender>),
            Arc::new(JwtService::new(JWT_SECRET)),
        )
    }

    pub fn unconfigured_app_state(&self) -> AppState {
        AppState::new(
            self.stores(),
            None,
            None,
            Arc::new(JwtService::new(JWT_SECRET)),
        )
    }
}

pub fn bearer(subscriber: &Subscriber) -> String {
    let token = JwtService::new(JWT_SECRET)
        .generate_token(subscriber)
        .expect("token generates");
    format!("Bearer {token}")
}
