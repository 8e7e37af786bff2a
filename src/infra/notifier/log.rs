//! Notifier that only logs offers.

use async_trait::async_trait;

use crate::core::{NotificationRequest, Notifier, NotifyError};

/// Emits each offer as a structured `tracing` event.
///
/// Stand-in for a mail gateway in deployments that deliver offers out of band.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn send_offer(&self, request: NotificationRequest) -> Result<(), NotifyError> {
        tracing::info!(
            email = %request.email,
            company = %request.company_name,
            category = %request.category_name,
            rank = request.rank,
            expires_at = %request.expires_at,
            url = %request.registration_url,
            "slot offer"
        );
        Ok(())
    }
}
