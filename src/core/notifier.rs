//! Outbound notification abstraction.
//!
//! The notifier owns delivery and its own retries. The lifecycle calls it at most
//! once per offer, after the offer has committed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Offer message for a notified applicant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRequest {
    /// Recipient.
    pub email: String,
    /// Applicant's company.
    pub company_name: String,
    /// Category display name.
    pub category_name: String,
    /// 1-based rank among waiting entries at the time of the offer.
    pub rank: u32,
    /// Offer deadline.
    pub expires_at: DateTime<Utc>,
    /// Link the applicant follows to claim the slot.
    pub registration_url: String,
}

/// Delivery failure reported by a notifier.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NotifyError {
    /// Transport or provider unreachable.
    #[error("notifier unavailable: {0}")]
    Unavailable(String),
    /// Provider refused the message.
    #[error("delivery rejected: {0}")]
    Rejected(String),
}

/// Delivers slot offers to applicants.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    /// Hand the offer to the delivery channel.
    async fn send_offer(&self, request: NotificationRequest) -> Result<(), NotifyError>;
}

/// What happened to the notifier call for one offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// The notifier accepted the offer.
    Delivered,
    /// The notifier or a lookup feeding it failed.
    Failed(String),
    /// The notifier did not answer within the configured timeout.
    TimedOut,
}

impl DeliveryStatus {
    /// Whether the notifier accepted the offer.
    #[must_use]
    pub const fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}
