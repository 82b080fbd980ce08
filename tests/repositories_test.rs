//! Postgres-backed checks for the guarantees the reconcilers rely on
//!
//! Run with a reachable server: `TEST_DATABASE_URL=postgresql://localhost/talent_billing_test
//! cargo test --test repositories_test -- --ignored`

mod common;

use std::sync::Arc;

use diesel::prelude::*;
use futures_util::future::join_all;
use serial_test::serial;
use uuid::Uuid;

use common::db::TestDatabase;
use talent_billing::PgPool;
use talent_billing::billing::{RegistrationStore, ShowcaseStore, SpotClaim, SubscriberStore};
use talent_billing::schema::{showcases, subscribers};
use talent_billing::showcase_registrations::{
    NewShowcaseRegistration, RegistrationInsert, RegistrationPaymentStatus,
};
use talent_billing::showcase_registrations_repo::ShowcaseRegistrationsRepository;
use talent_billing::showcases::{Capacity, SeatLimit, ShowcaseStatus};
use talent_billing::showcases_repo::ShowcasesRepository;
use talent_billing::subscribers::{SubscriberBillingChanges, SubscriptionStatus};
use talent_billing::subscribers_repo::SubscribersRepository;

async fn insert_showcase(pool: &PgPool, slug: &str, capacity: Option<i32>) -> Uuid {
    let pool = pool.clone();
    let slug = slug.to_string();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get().unwrap();
        diesel::insert_into(showcases::table)
            .values((
                showcases::slug.eq(slug),
                showcases::title.eq("Spring Elite Showcase"),
                showcases::status.eq(ShowcaseStatus::Published),
                showcases::registration_open.eq(true),
                showcases::stripe_price_id.eq("price_showcase"),
                showcases::capacity.eq(capacity),
                showcases::spots_remaining.eq(capacity),
            ))
            .returning(showcases::id)
            .get_result(&mut conn)
            .unwrap()
    })
    .await
    .unwrap()
}

async fn insert_subscriber(pool: &PgPool, email: &str) -> Uuid {
    let pool = pool.clone();
    let email = email.to_string();
    tokio::task::spawn_blocking(move || {
        let mut conn = pool.get().unwrap();
        diesel::insert_into(subscribers::table)
            .values(subscribers::email.eq(email))
            .returning(subscribers::id)
            .get_result(&mut conn)
            .unwrap()
    })
    .await
    .unwrap()
}

fn registration(showcase_id: Uuid, session_id: &str) -> NewShowcaseRegistration {
    NewShowcaseRegistration {
        showcase_id,
        user_id: None,
        full_name: "Sam Player".to_string(),
        email: "sam@example.com".to_string(),
        role: None,
        sport: None,
        waiver_accepted_at: None,
        waiver_version: Some("v1".to_string()),
        refund_policy_accepted_at: None,
        refund_policy_version: None,
        payment_status: RegistrationPaymentStatus::Paid,
        stripe_checkout_session_id: session_id.to_string(),
        stripe_payment_intent_id: Some("pi_1".to_string()),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore] // Requires PostgreSQL
#[serial]
async fn test_claim_spot_never_goes_negative() {
    let db = TestDatabase::new().await.expect("Failed to create test database");
    let showcase_id = insert_showcase(&db.pool(), "last-seats", Some(3)).await;
    let repo = Arc::new(ShowcasesRepository::new(db.pool()));
    let limit = SeatLimit {
        capacity: 3,
        remaining: 3,
    };

    let claims = join_all((0..10).map(|_| {
        let repo = repo.clone();
        tokio::spawn(async move { repo.claim_spot(showcase_id, &limit).await.unwrap() })
    }))
    .await;

    let claimed = claims
        .into_iter()
        .filter(|claim| matches!(claim, Ok(SpotClaim::Claimed { .. })))
        .count();
    assert_eq!(claimed, 3);

    let showcase = repo.get_by_id(showcase_id).await.unwrap().unwrap();
    assert_eq!(
        showcase.capacity,
        Capacity::Limited(SeatLimit {
            capacity: 3,
            remaining: 0
        })
    );
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
#[serial]
async fn test_lookup_by_id_or_slug() {
    let db = TestDatabase::new().await.expect("Failed to create test database");
    let showcase_id = insert_showcase(&db.pool(), "open-house", None).await;
    let repo = ShowcasesRepository::new(db.pool());

    let by_slug = repo.get_by_id_or_slug("open-house").await.unwrap().unwrap();
    assert_eq!(by_slug.id, showcase_id);
    assert_eq!(by_slug.capacity, Capacity::Unlimited);

    let by_id = repo
        .get_by_id_or_slug(&showcase_id.to_string())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_id.slug, "open-house");

    assert!(repo.get_by_id_or_slug("missing").await.unwrap().is_none());
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
#[serial]
async fn test_registration_unique_per_checkout_session() {
    let db = TestDatabase::new().await.expect("Failed to create test database");
    let showcase_id = insert_showcase(&db.pool(), "spring-elite", Some(50)).await;
    let repo = ShowcaseRegistrationsRepository::new(db.pool());

    let first = repo
        .create_if_absent(registration(showcase_id, "sess_123"))
        .await
        .unwrap();
    assert!(matches!(first, RegistrationInsert::Created(_)));

    let second = repo
        .create_if_absent(registration(showcase_id, "sess_123"))
        .await
        .unwrap();
    assert!(matches!(second, RegistrationInsert::AlreadyExists));

    let stored = repo
        .get_by_checkout_session_id("sess_123")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.payment_status, RegistrationPaymentStatus::Paid);
    assert_eq!(stored.stripe_payment_intent_id.as_deref(), Some("pi_1"));
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
#[serial]
async fn test_registration_keeps_user_id_without_matching_subscriber() {
    let db = TestDatabase::new().await.expect("Failed to create test database");
    let showcase_id = insert_showcase(&db.pool(), "fall-combine", Some(20)).await;
    let repo = ShowcaseRegistrationsRepository::new(db.pool());
    let unknown_user = Uuid::new_v4();

    let inserted = repo
        .create_if_absent(NewShowcaseRegistration {
            user_id: Some(unknown_user),
            ..registration(showcase_id, "sess_unknown_user")
        })
        .await
        .unwrap();
    assert!(matches!(inserted, RegistrationInsert::Created(_)));

    let stored = repo
        .get_by_checkout_session_id("sess_unknown_user")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.user_id, Some(unknown_user));
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
#[serial]
async fn test_subscriber_customer_link_is_write_once() {
    let db = TestDatabase::new().await.expect("Failed to create test database");
    let id = insert_subscriber(&db.pool(), "coach@example.com").await;
    let repo = SubscribersRepository::new(db.pool());

    assert!(repo.link_customer(id, "cus_first").await.unwrap());
    assert!(!repo.link_customer(id, "cus_second").await.unwrap());

    let linked = repo.get_by_stripe_customer_id("cus_first").await.unwrap().unwrap();
    assert_eq!(linked.id, id);
    assert!(repo.get_by_stripe_customer_id("cus_second").await.unwrap().is_none());

    let updated = repo
        .update_billing(
            id,
            SubscriberBillingChanges {
                stripe_subscription_id: Some("sub_1".to_string()),
                subscription_status: Some(SubscriptionStatus::Active),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.stripe_customer_id.as_deref(), Some("cus_first"));
    assert_eq!(updated.stripe_subscription_id.as_deref(), Some("sub_1"));
    assert!(updated.subscription_status.is_active());

    assert!(
        repo.update_billing(Uuid::new_v4(), SubscriberBillingChanges::status(SubscriptionStatus::Inactive))
            .await
            .unwrap()
            .is_none()
    );
}
