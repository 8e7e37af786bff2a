//! Tests for utility helpers

use chrono::{Duration, TimeZone, Utc};
use prometheus_waitlist::util::{normalize_email, optional_text, require_text, Clock, ManualClock};

#[test]
fn test_manual_clock_advances_only_when_told() {
    let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    let clock = ManualClock::new(start);
    assert_eq!(clock.now(), start);

    clock.advance(Duration::days(7));
    assert_eq!(clock.now(), start + Duration::days(7));

    clock.set(start);
    assert_eq!(clock.now(), start);
}

#[test]
fn test_normalize_email() {
    assert_eq!(normalize_email(" Hi@Example.COM ").unwrap(), "hi@example.com");
    for bad in ["", "plain", "a@b", "@example.com", "a@@example.com", "a b@example.com"] {
        assert!(normalize_email(bad).is_err(), "{bad:?} accepted");
    }
}

#[test]
fn test_text_fields() {
    assert_eq!(require_text("company_name", "  Acme ", 10).unwrap(), "Acme");
    assert!(require_text("company_name", "", 10).is_err());
    assert!(require_text("company_name", "abcdefghijk", 10).is_err());

    assert_eq!(optional_text("message", Some("  "), 10).unwrap(), None);
    assert_eq!(optional_text("message", None, 10).unwrap(), None);
    assert_eq!(
        optional_text("message", Some(" hi "), 10).unwrap(),
        Some("hi".to_string())
    );
}
