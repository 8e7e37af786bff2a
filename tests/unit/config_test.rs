//! Tests for configuration validation

use prometheus_waitlist::config::{StoreBackendConfig, WaitlistConfig};

#[test]
fn test_waitlist_config_validation() {
    assert!(WaitlistConfig::with_capacity(300).validate().is_ok());
}

#[test]
fn test_waitlist_config_invalid_capacity() {
    assert!(WaitlistConfig::with_capacity(0).validate().is_err());
}

#[test]
fn test_waitlist_config_invalid_window() {
    let cfg = WaitlistConfig {
        notification_window_secs: 0,
        ..WaitlistConfig::with_capacity(10)
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_waitlist_config_rejects_oversized_window() {
    let cfg = WaitlistConfig {
        notification_window_secs: u64::MAX / 2,
        ..WaitlistConfig::with_capacity(10)
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_waitlist_config_invalid_registration_url() {
    let cfg = WaitlistConfig {
        registration_base_url: "ftp://example.com".into(),
        ..WaitlistConfig::with_capacity(10)
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_waitlist_config_postgres_needs_url() {
    let cfg = WaitlistConfig {
        store: StoreBackendConfig::Postgres {
            database_url: " ".into(),
            max_connections: 5,
        },
        ..WaitlistConfig::with_capacity(10)
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_waitlist_config_from_json() {
    let json = r#"{
        "capacity": 300,
        "notification_window_secs": 86400,
        "registration_base_url": "https://club.example/join",
        "store": { "backend": "postgres", "database_url": "postgres://db/waitlist" }
    }"#;
    let cfg = WaitlistConfig::from_json_str(json).expect("valid config");
    assert_eq!(cfg.capacity, 300);
    assert_eq!(cfg.notification_window(), chrono::Duration::days(1));
    assert_eq!(cfg.notifier_timeout_secs, 10);
    assert_eq!(cfg.sweep_interval_secs, 300);
    assert_eq!(
        cfg.store,
        StoreBackendConfig::Postgres {
            database_url: "postgres://db/waitlist".into(),
            max_connections: 5,
        }
    );

    let settings = cfg.lifecycle_settings();
    assert_eq!(settings.registration_base_url, "https://club.example/join");
}

#[test]
fn test_waitlist_config_from_json_rejects_invalid() {
    assert!(WaitlistConfig::from_json_str(r#"{"capacity": 0}"#).is_err());
    assert!(WaitlistConfig::from_json_str("not json").is_err());
}

#[test]
fn test_waitlist_config_lookup_requires_capacity() {
    let err = WaitlistConfig::from_lookup(|_| None).unwrap_err();
    assert!(err.to_string().contains("WAITLIST_CAPACITY"));
}

#[test]
fn test_waitlist_config_lookup_rejects_unknown_backend() {
    let err = WaitlistConfig::from_lookup(|key| match key {
        "WAITLIST_CAPACITY" => Some("5".into()),
        "WAITLIST_STORE" => Some("redis".into()),
        _ => None,
    })
    .unwrap_err();
    assert!(err.to_string().contains("redis"));
}
