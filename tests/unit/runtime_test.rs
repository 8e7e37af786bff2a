//! Tests for the API handlers and the expiry sweeper

use std::sync::Arc;
use std::time::Duration;

use prometheus_waitlist::core::{
    AdmissionRequest, Category, LifecycleSettings, WaitlistPool, WaitlistStatus,
};
use prometheus_waitlist::infra::{InMemoryStore, RecordingNotifier};
use prometheus_waitlist::runtime::{
    complete_registration, enrollment_receipt, health, list_waitlist, status, submit_enrollment,
    ApiErrorCode,
    EnrollmentSubmission, ExpirySweeper, WaitlistQuery,
};
use prometheus_waitlist::util::{Clock, ManualClock};
use uuid::Uuid;

type Pool = WaitlistPool<InMemoryStore, RecordingNotifier>;

fn pool(capacity: u32) -> (Arc<Pool>, Arc<InMemoryStore>, Arc<ManualClock>, Category) {
    let category = Category {
        id: Uuid::new_v4(),
        name: "Studios".into(),
    };
    let store = Arc::new(InMemoryStore::with_categories(capacity, [category.clone()]));
    let clock = Arc::new(ManualClock::starting_now());
    let pool = WaitlistPool::new(
        Arc::clone(&store),
        Arc::new(RecordingNotifier::new()),
        Arc::clone(&clock) as Arc<dyn Clock>,
        LifecycleSettings::default(),
    );
    (Arc::new(pool), store, clock, category)
}

fn submission(email: &str, category: &Category) -> EnrollmentSubmission {
    EnrollmentSubmission {
        email: email.into(),
        company_name: "Acme".into(),
        category_id: category.id,
        message: None,
    }
}

#[tokio::test]
async fn test_submit_enrollment_returns_rank() {
    let (pool, _store, _clock, category) = pool(1);
    let first = submit_enrollment(&pool, submission("a@x.io", &category)).await.unwrap();
    let second = submit_enrollment(&pool, submission("b@x.io", &category)).await.unwrap();
    assert_eq!((first.rank, second.rank), (Some(1), Some(2)));
    assert_eq!(second.status, WaitlistStatus::Waiting);

    let err = submit_enrollment(&pool, submission("A@x.io", &category))
        .await
        .unwrap_err();
    assert_eq!(err.code, ApiErrorCode::Conflict);
}

#[tokio::test]
async fn test_receipt_reflects_offer_made_after_enrollment() {
    let (pool, _store, clock, category) = pool(1);
    let first = submit_enrollment(&pool, submission("a@x.io", &category)).await.unwrap();
    let second = submit_enrollment(&pool, submission("b@x.io", &category)).await.unwrap();
    pool.cascade().await.unwrap();

    let offered = enrollment_receipt(&pool, first.entry_id).await.unwrap();
    assert_eq!(offered.status, WaitlistStatus::Notified);
    assert_eq!(offered.rank, None);
    assert_eq!(
        offered.expires_at,
        Some(clock.now() + chrono::Duration::days(7))
    );

    let waiting = enrollment_receipt(&pool, second.entry_id).await.unwrap();
    assert_eq!((waiting.status, waiting.rank), (WaitlistStatus::Waiting, Some(1)));

    let err = enrollment_receipt(&pool, Uuid::new_v4()).await.unwrap_err();
    assert_eq!(err.code, ApiErrorCode::NotFound);
}

#[tokio::test]
async fn test_status_and_listing() {
    let (pool, _store, _clock, category) = pool(2);
    submit_enrollment(&pool, submission("a@x.io", &category)).await.unwrap();
    submit_enrollment(&pool, submission("b@x.io", &category)).await.unwrap();
    pool.cascade().await.unwrap();

    let snapshot = status(&pool).await.unwrap();
    assert_eq!(snapshot.available_slots, 2);
    assert_eq!(snapshot.notified_count, 2);

    let notified = list_waitlist(
        &pool,
        &WaitlistQuery {
            status: Some("notified".into()),
            category_id: Some(category.id),
        },
    )
    .await
    .unwrap();
    assert_eq!(notified.len(), 2);
    assert!(notified.iter().all(|e| e.rank.is_none()));

    let err = list_waitlist(
        &pool,
        &WaitlistQuery {
            status: Some("pending".into()),
            category_id: None,
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.code, ApiErrorCode::Validation);
}

#[tokio::test]
async fn test_complete_registration() {
    let (pool, _store, clock, category) = pool(1);
    let receipt = submit_enrollment(&pool, submission("a@x.io", &category)).await.unwrap();
    let late = submit_enrollment(&pool, submission("b@x.io", &category)).await.unwrap();

    let err = complete_registration(&pool, late.entry_id).await.unwrap_err();
    assert_eq!(err.code, ApiErrorCode::Conflict);

    pool.cascade().await.unwrap();
    let registered = complete_registration(&pool, receipt.entry_id).await.unwrap();
    assert_eq!(registered.slot_number, 1);

    clock.advance(chrono::Duration::days(30));
    let err = complete_registration(&pool, Uuid::new_v4()).await.unwrap_err();
    assert_eq!(err.code, ApiErrorCode::NotFound);
}

#[tokio::test]
async fn test_storage_errors_are_hidden() {
    let (pool, store, _clock, category) = pool(1);
    store.set_available(false);

    let err = submit_enrollment(&pool, submission("a@x.io", &category))
        .await
        .unwrap_err();
    assert_eq!(err.code, ApiErrorCode::Unavailable);
    assert!(!err.message.contains("in-memory"));

    let report = health(&pool).await;
    assert!(!report.ok);
    assert_eq!(report.capacity, 1);

    store.set_available(true);
    assert!(health(&pool).await.ok);
}

#[tokio::test]
async fn test_pool_full_admission_maps_to_pool_full() {
    let (pool, _store, _clock, category) = pool(1);
    let admit = |email: &str| AdmissionRequest {
        email: email.into(),
        company_name: "Acme".into(),
        category_id: category.id,
    };
    pool.admit(admit("a@x.io"), None).await.unwrap();
    let err: prometheus_waitlist::runtime::ApiError =
        pool.admit(admit("b@x.io"), None).await.unwrap_err().into();
    assert_eq!(err.code, ApiErrorCode::PoolFull);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sweeper_expires_and_cascades() {
    let (pool, _store, clock, category) = pool(1);
    let c = submit_enrollment(&pool, submission("c@x.io", &category)).await.unwrap();
    let d = submit_enrollment(&pool, submission("d@x.io", &category)).await.unwrap();
    pool.cascade().await.unwrap();
    clock.advance(chrono::Duration::days(8));

    let sweeper = ExpirySweeper::spawn(Arc::clone(&pool), Duration::from_millis(20));
    assert!(sweeper.is_running());

    let mut d_status = WaitlistStatus::Waiting;
    for _ in 0..100 {
        d_status = pool.waitlist().entry(d.entry_id).await.unwrap().status;
        if d_status == WaitlistStatus::Notified {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    sweeper.shutdown().await;

    assert_eq!(d_status, WaitlistStatus::Notified);
    assert_eq!(
        pool.waitlist().entry(c.entry_id).await.unwrap().status,
        WaitlistStatus::Expired
    );
}
