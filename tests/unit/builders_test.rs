//! Tests for builder modules

use std::sync::Arc;

use prometheus_waitlist::builders::{build_pool, connect_postgres, in_memory_store};
use prometheus_waitlist::config::WaitlistConfig;
use prometheus_waitlist::core::{WaitlistError, WaitlistStore};
use prometheus_waitlist::infra::{InMemoryStore, TracingNotifier};
use prometheus_waitlist::util::{Clock, SystemClock};

fn clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}

#[tokio::test]
async fn test_build_pool_from_config() {
    let cfg = WaitlistConfig::with_capacity(4);
    let store = Arc::new(in_memory_store(&cfg));
    assert_eq!(store.capacity(), 4);

    let pool = build_pool(&cfg, store, Arc::new(TracingNotifier), clock()).expect("pool");
    let status = pool.get_status().await.unwrap();
    assert_eq!(status.total_capacity, 4);
    assert_eq!(status.available_slots, 4);
    assert_eq!(
        pool.lifecycle().settings().notification_window,
        chrono::Duration::days(7)
    );
}

#[test]
fn test_build_pool_rejects_invalid_config() {
    let cfg = WaitlistConfig::with_capacity(0);
    let store = Arc::new(InMemoryStore::new(0));
    let err = build_pool(&cfg, store, Arc::new(TracingNotifier), clock())
        .err()
        .expect("invalid config accepted");
    assert!(matches!(err, WaitlistError::Validation(_)));
}

#[test]
fn test_build_pool_rejects_capacity_mismatch() {
    let cfg = WaitlistConfig::with_capacity(10);
    let store = Arc::new(InMemoryStore::new(5));
    let err = build_pool(&cfg, store, Arc::new(TracingNotifier), clock())
        .err()
        .expect("mismatch accepted");
    assert!(err.to_string().contains("does not match"));
}

#[tokio::test]
async fn test_connect_postgres_requires_postgres_backend() {
    let cfg = WaitlistConfig::with_capacity(10);
    let err = connect_postgres(&cfg).await.err().expect("in-memory config accepted");
    assert!(err.to_string().contains("not postgres"));
}
