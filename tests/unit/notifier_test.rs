//! Tests for notifier backends

use std::time::Duration;

use chrono::Utc;
use prometheus_waitlist::core::{NotificationRequest, Notifier, NotifyError};
use prometheus_waitlist::infra::{RecordingNotifier, TracingNotifier};

fn request(email: &str) -> NotificationRequest {
    NotificationRequest {
        email: email.into(),
        company_name: "Acme".into(),
        category_name: "Studios".into(),
        rank: 1,
        expires_at: Utc::now(),
        registration_url: "https://club.example/join?entry=1".into(),
    }
}

#[tokio::test]
async fn test_recording_notifier_keeps_offers() {
    let notifier = RecordingNotifier::new();
    notifier.send_offer(request("a@x.io")).await.unwrap();
    notifier.send_offer(request("b@x.io")).await.unwrap();

    assert_eq!(notifier.sent().len(), 2);
    assert_eq!(notifier.sent_to("b@x.io").len(), 1);
}

#[tokio::test]
async fn test_recording_notifier_simulates_outage() {
    let notifier = RecordingNotifier::new();
    notifier.set_failing(true);
    let err = notifier.send_offer(request("a@x.io")).await.unwrap_err();
    assert!(matches!(err, NotifyError::Unavailable(_)));
    assert!(notifier.sent().is_empty());

    notifier.set_failing(false);
    notifier.send_offer(request("a@x.io")).await.unwrap();
    assert_eq!(notifier.sent().len(), 1);
}

#[tokio::test]
async fn test_recording_notifier_delay() {
    let notifier = RecordingNotifier::new();
    notifier.set_delay(Some(Duration::from_millis(200)));
    let outcome =
        tokio::time::timeout(Duration::from_millis(20), notifier.send_offer(request("a@x.io")))
            .await;
    assert!(outcome.is_err());
}

#[tokio::test]
async fn test_tracing_notifier_always_accepts() {
    assert!(TracingNotifier.send_offer(request("a@x.io")).await.is_ok());
}
