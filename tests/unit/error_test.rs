//! Tests for error types

use prometheus_waitlist::core::{Outcome, WaitlistError};

#[test]
fn test_pool_full_error() {
    let err = WaitlistError::PoolFull { capacity: 300 };
    assert_eq!(format!("{err}"), "pool is full (300 slots)");
    assert!(err.is_user_facing());
    assert!(!err.is_retryable());
}

#[test]
fn test_conflict_error() {
    let err = WaitlistError::Conflict("a@b.io is already on the waitlist".to_string());
    assert_eq!(format!("{err}"), "conflict: a@b.io is already on the waitlist");
}

#[test]
fn test_storage_error_is_retryable_not_user_facing() {
    let err = WaitlistError::Storage("connection refused".to_string());
    assert_eq!(format!("{err}"), "storage error: connection refused");
    assert!(err.is_retryable());
    assert!(!err.is_user_facing());
}

#[test]
fn test_capacity_exhausted_is_internal() {
    let err = WaitlistError::CapacityExhausted { capacity: 2 };
    assert!(!err.is_user_facing());
    assert!(!err.is_retryable());
}

#[test]
fn test_sqlx_errors_map_to_storage() {
    let err: WaitlistError = sqlx::Error::PoolTimedOut.into();
    assert!(matches!(err, WaitlistError::Storage(_)));
}

#[test]
fn test_outcome_helpers() {
    let applied: Outcome<u32> = Some(7).into();
    assert!(applied.is_applied());
    assert_eq!(applied.map(|v| v * 2).applied(), Some(14));

    let handled: Outcome<u32> = None.into();
    assert!(!handled.is_applied());
    assert_eq!(handled.applied(), None);
}
