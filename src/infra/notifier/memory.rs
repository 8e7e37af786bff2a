//! Recording notifier for development and tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::{NotificationRequest, Notifier, NotifyError};

/// Keeps every offer it is asked to send.
///
/// Can be told to fail or to stall, to exercise the delivery paths.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<NotificationRequest>>,
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl RecordingNotifier {
    /// Create an empty notifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Offers accepted so far, oldest first.
    #[must_use]
    pub fn sent(&self) -> Vec<NotificationRequest> {
        self.sent.lock().clone()
    }

    /// Offers accepted for `email`.
    #[must_use]
    pub fn sent_to(&self, email: &str) -> Vec<NotificationRequest> {
        self.sent
            .lock()
            .iter()
            .filter(|r| r.email == email)
            .cloned()
            .collect()
    }

    /// Reject every following offer.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }

    /// Sleep this long before answering.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_offer(&self, request: NotificationRequest) -> Result<(), NotifyError> {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::Acquire) {
            return Err(NotifyError::Unavailable(format!(
                "recording notifier set to fail for {}",
                request.email
            )));
        }
        self.sent.lock().push(request);
        Ok(())
    }
}
