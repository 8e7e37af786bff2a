//! Offer lifecycle: notify, promote, expire, cancel.
//!
//! Each operation is a status-conditioned store transaction. Losing a race is
//! reported as [`Outcome::AlreadyHandled`]. The notifier runs only after the
//! offer has committed, bounded by a timeout, and its failure never undoes the
//! transition.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::membership::Membership;
use crate::core::model::{Admission, EntryId, WaitlistEntry};
use crate::core::notifier::{DeliveryStatus, NotificationRequest, Notifier};
use crate::core::store::{TransitionRequest, WaitlistStore};
use crate::core::{Outcome, WaitlistError};
use crate::util::clock::Clock;

/// Default offer window: seven days.
pub const DEFAULT_NOTIFICATION_WINDOW_SECS: u64 = 7 * 24 * 60 * 60;

/// Offer window of `secs` seconds, or `None` if chrono cannot represent it.
#[must_use]
pub fn offer_window(secs: u64) -> Option<chrono::Duration> {
    i64::try_from(secs).ok().and_then(chrono::Duration::try_seconds)
}

/// Tunables for the lifecycle.
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    /// How long a notified applicant has to claim the slot.
    pub notification_window: chrono::Duration,
    /// Upper bound on one notifier call.
    pub notifier_timeout: Duration,
    /// Base of the link sent in offers; `?entry=<id>` is appended.
    pub registration_base_url: String,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            notification_window: offer_window(DEFAULT_NOTIFICATION_WINDOW_SECS)
                .unwrap_or_else(|| chrono::Duration::days(7)),
            notifier_timeout: Duration::from_secs(10),
            registration_base_url: "https://example.com/register".into(),
        }
    }
}

impl LifecycleSettings {
    /// Registration link for `entry_id`.
    #[must_use]
    pub fn registration_url(&self, entry_id: EntryId) -> String {
        let separator = if self.registration_base_url.contains('?') {
            '&'
        } else {
            '?'
        };
        format!("{}{separator}entry={entry_id}", self.registration_base_url)
    }
}

/// Result of a committed offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyReceipt {
    /// The entry, now `Notified`.
    pub entry: WaitlistEntry,
    /// Rank reported to the applicant.
    pub rank: u32,
    /// Notifier result.
    pub delivery: DeliveryStatus,
}

/// Drives waitlist entries through the offer state machine.
pub struct NotificationLifecycle<S, N> {
    store: Arc<S>,
    notifier: Arc<N>,
    clock: Arc<dyn Clock>,
    settings: LifecycleSettings,
}

impl<S, N> Clone for NotificationLifecycle<S, N> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            notifier: Arc::clone(&self.notifier),
            clock: Arc::clone(&self.clock),
            settings: self.settings.clone(),
        }
    }
}

impl<S, N> NotificationLifecycle<S, N>
where
    S: WaitlistStore,
    N: Notifier,
{
    /// Create the lifecycle from its collaborators.
    pub fn new(
        store: Arc<S>,
        notifier: Arc<N>,
        clock: Arc<dyn Clock>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            store,
            notifier,
            clock,
            settings,
        }
    }

    /// Active settings.
    pub const fn settings(&self) -> &LifecycleSettings {
        &self.settings
    }

    fn offer_deadline(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_add_signed(self.settings.notification_window)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Offer a slot to a specific waiting entry.
    ///
    /// Does not check for a free slot; the cascade path ([`Self::notify_next`])
    /// does.
    pub async fn notify(
        &self,
        entry_id: EntryId,
        actor: Option<String>,
    ) -> Result<Outcome<NotifyReceipt>, WaitlistError> {
        let now = self.clock.now();
        let request = TransitionRequest::notify(entry_id, now, self.offer_deadline(now), actor);
        match self.store.transition(request).await? {
            Outcome::Applied(entry) => {
                tracing::info!(
                    entry_id = %entry.id,
                    position = entry.position,
                    expires_at = ?entry.expires_at,
                    "waitlist entry notified"
                );
                Ok(Outcome::Applied(self.dispatch(entry).await))
            }
            Outcome::AlreadyHandled => {
                tracing::debug!(%entry_id, "notify skipped: entry no longer waiting");
                Ok(Outcome::AlreadyHandled)
            }
        }
    }

    /// Offer the next free slot to the lowest-position waiting entry.
    ///
    /// Returns `None` when every free slot already has an outstanding offer or
    /// nobody is waiting.
    pub async fn notify_next(&self) -> Result<Option<NotifyReceipt>, WaitlistError> {
        let now = self.clock.now();
        let Some(entry) = self.store.notify_next(now, self.offer_deadline(now)).await? else {
            return Ok(None);
        };
        tracing::info!(
            entry_id = %entry.id,
            position = entry.position,
            "next waitlist entry notified"
        );
        Ok(Some(self.dispatch(entry).await))
    }

    /// Keep notifying until every free slot has exactly one outstanding offer.
    pub async fn cascade(&self) -> Result<Vec<NotifyReceipt>, WaitlistError> {
        let mut receipts = Vec::new();
        while let Some(receipt) = self.notify_next().await? {
            receipts.push(receipt);
        }
        if !receipts.is_empty() {
            tracing::info!(notified = receipts.len(), "cascade sent offers");
        }
        Ok(receipts)
    }

    /// Claim the offered slot: promote the entry and create its member in one
    /// transaction.
    ///
    /// `AlreadyHandled` means the offer expired or was cancelled first; the
    /// caller must abort the registration since no member was created.
    pub async fn promote(
        &self,
        entry_id: EntryId,
        actor: Option<String>,
    ) -> Result<Outcome<Admission>, WaitlistError> {
        Membership::new(Arc::clone(&self.store), Arc::clone(&self.clock))
            .register(entry_id, actor)
            .await
    }

    /// Expire every offer whose window lapsed. Idempotent.
    ///
    /// Does not notify anyone; the scheduler cascades afterwards.
    pub async fn expire_overdue(&self) -> Result<Vec<WaitlistEntry>, WaitlistError> {
        let expired = self.store.expire_overdue(self.clock.now()).await?;
        if !expired.is_empty() {
            tracing::info!(expired = expired.len(), "expired lapsed offers");
        }
        Ok(expired)
    }

    /// Withdraw a waiting or notified entry.
    pub async fn cancel(
        &self,
        entry_id: EntryId,
        actor: Option<String>,
    ) -> Result<Outcome<WaitlistEntry>, WaitlistError> {
        let request = TransitionRequest::cancel(entry_id, self.clock.now(), actor);
        let outcome = self.store.transition(request).await?;
        match &outcome {
            Outcome::Applied(_) => tracing::info!(%entry_id, "waitlist entry cancelled"),
            Outcome::AlreadyHandled => {
                tracing::debug!(%entry_id, "cancel skipped: entry already terminal");
            }
        }
        Ok(outcome)
    }

    /// Build the offer and call the notifier once. Failures end up in the receipt.
    async fn dispatch(&self, entry: WaitlistEntry) -> NotifyReceipt {
        let (request, rank) = match self.offer_for(&entry).await {
            Ok(built) => built,
            Err(err) => {
                tracing::warn!(entry_id = %entry.id, error = %err, "could not build offer");
                return NotifyReceipt {
                    entry,
                    rank: 0,
                    delivery: DeliveryStatus::Failed(err.to_string()),
                };
            }
        };

        let delivery = match tokio::time::timeout(
            self.settings.notifier_timeout,
            self.notifier.send_offer(request),
        )
        .await
        {
            Ok(Ok(())) => DeliveryStatus::Delivered,
            Ok(Err(err)) => {
                tracing::warn!(entry_id = %entry.id, error = %err, "offer delivery failed");
                DeliveryStatus::Failed(err.to_string())
            }
            Err(_) => {
                tracing::warn!(
                    entry_id = %entry.id,
                    timeout_ms = self.settings.notifier_timeout.as_millis(),
                    "offer delivery timed out"
                );
                DeliveryStatus::TimedOut
            }
        };

        NotifyReceipt {
            entry,
            rank,
            delivery,
        }
    }

    async fn offer_for(
        &self,
        entry: &WaitlistEntry,
    ) -> Result<(NotificationRequest, u32), WaitlistError> {
        let rank = self.store.waiting_rank(entry.position).await?;
        let category_name = self
            .store
            .category(entry.category_id)
            .await?
            .map(|c| c.name)
            .ok_or_else(|| WaitlistError::NotFound(format!("category {}", entry.category_id)))?;
        let expires_at = entry.expires_at.ok_or_else(|| {
            WaitlistError::Storage(format!("notified entry {} has no expiry", entry.id))
        })?;

        let request = NotificationRequest {
            email: entry.email.clone(),
            company_name: entry.company_name.clone(),
            category_name,
            rank,
            expires_at,
            registration_url: self.settings.registration_url(entry.id),
        };
        Ok((request, rank))
    }
}
