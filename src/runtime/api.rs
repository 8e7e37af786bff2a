//! API-facing request/response models and thin handlers over the pool.
//!
//! Handlers never leak storage details: store failures are logged here and
//! reported to callers with a generic message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{
    CapacitySnapshot, CategoryId, EnrollmentRequest, EntryFilter, EntryId, MemberId, Notifier,
    Outcome, RankedEntry, WaitlistError, WaitlistPool, WaitlistStatus, WaitlistStore,
};

/// Pool occupancy as shown to admins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Fixed number of slots.
    pub total_capacity: u32,
    /// Active members.
    pub current_count: u32,
    /// Free slots.
    pub available_slots: u32,
    /// Waiting plus notified entries.
    pub waitlist_count: u32,
    /// Outstanding offers.
    pub notified_count: u32,
    /// No free slot.
    pub is_full: bool,
}

impl From<CapacitySnapshot> for StatusResponse {
    fn from(s: CapacitySnapshot) -> Self {
        Self {
            total_capacity: s.total_capacity,
            current_count: s.current_count,
            available_slots: s.available_slots,
            waitlist_count: s.waitlist_count,
            notified_count: s.notified_count,
            is_full: s.is_full,
        }
    }
}

/// Enrollment form payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentSubmission {
    /// Contact email.
    pub email: String,
    /// Company name.
    pub company_name: String,
    /// Category to enroll under.
    pub category_id: CategoryId,
    /// Optional note.
    #[serde(default)]
    pub message: Option<String>,
}

/// An applicant's standing, read back from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentReceipt {
    /// The entry.
    pub entry_id: EntryId,
    /// Permanent queue position.
    pub position: i64,
    /// Current place in line; `None` once the entry has left `waiting`.
    pub rank: Option<u32>,
    /// Current status. A sweep may already have made an offer.
    pub status: WaitlistStatus,
    /// When the offer lapses, if one is open.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Returned after a successful registration against an offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationReceipt {
    /// New member.
    pub member_id: MemberId,
    /// Claimed slot.
    pub slot_number: u32,
    /// Entry that held the offer.
    pub entry_id: EntryId,
}

/// Admin listing filters. `status` is the lowercase status name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitlistQuery {
    /// Only entries with this status.
    #[serde(default)]
    pub status: Option<String>,
    /// Only entries in this category.
    #[serde(default)]
    pub category_id: Option<CategoryId>,
}

/// One row of the admin listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryView {
    /// Entry id.
    pub id: EntryId,
    /// Contact email.
    pub email: String,
    /// Company name.
    pub company_name: String,
    /// Category.
    pub category_id: CategoryId,
    /// Permanent queue position.
    pub position: i64,
    /// Lifecycle status.
    pub status: WaitlistStatus,
    /// Place in line while waiting.
    pub rank: Option<u32>,
    /// When the offer was made.
    pub notified_at: Option<DateTime<Utc>>,
    /// When the offer lapses.
    pub expires_at: Option<DateTime<Utc>>,
    /// Enrollment time.
    pub created_at: DateTime<Utc>,
}

impl From<RankedEntry> for EntryView {
    fn from(ranked: RankedEntry) -> Self {
        let e = ranked.entry;
        Self {
            id: e.id,
            email: e.email,
            company_name: e.company_name,
            category_id: e.category_id,
            position: e.position,
            status: e.status,
            rank: ranked.rank,
            notified_at: e.notified_at,
            expires_at: e.expires_at,
            created_at: e.created_at,
        }
    }
}

/// Health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// Store answered.
    pub ok: bool,
    /// Configured slots.
    pub capacity: u32,
}

/// Caller-facing error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorCode {
    /// Bad input.
    Validation,
    /// Duplicate, or the offer is no longer open.
    Conflict,
    /// No free slot.
    PoolFull,
    /// Unknown id.
    NotFound,
    /// Temporary failure; retry later.
    Unavailable,
    /// Server-side bug.
    Internal,
}

/// Error body returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// Category.
    pub code: ApiErrorCode,
    /// Message safe to display.
    pub message: String,
}

impl ApiError {
    fn new(code: ApiErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<WaitlistError> for ApiError {
    fn from(err: WaitlistError) -> Self {
        match err {
            WaitlistError::Validation(msg) => Self::new(ApiErrorCode::Validation, msg),
            WaitlistError::Conflict(msg) => Self::new(ApiErrorCode::Conflict, msg),
            WaitlistError::NotFound(msg) => Self::new(ApiErrorCode::NotFound, msg),
            err @ WaitlistError::PoolFull { .. } => {
                Self::new(ApiErrorCode::PoolFull, err.to_string())
            }
            err @ WaitlistError::Storage(_) => {
                tracing::error!(error = %err, "request failed on storage");
                Self::new(
                    ApiErrorCode::Unavailable,
                    "the waitlist is temporarily unavailable, please retry",
                )
            }
            err @ WaitlistError::CapacityExhausted { .. } => {
                tracing::error!(error = %err, "slot accounting invariant violated");
                Self::new(ApiErrorCode::Internal, "internal error")
            }
        }
    }
}

/// Current occupancy.
pub async fn status<S, N>(pool: &WaitlistPool<S, N>) -> Result<StatusResponse, ApiError>
where
    S: WaitlistStore,
    N: Notifier,
{
    Ok(pool.get_status().await?.into())
}

/// Enroll an applicant from the public form.
pub async fn submit_enrollment<S, N>(
    pool: &WaitlistPool<S, N>,
    req: EnrollmentSubmission,
) -> Result<EnrollmentReceipt, ApiError>
where
    S: WaitlistStore,
    N: Notifier,
{
    let entry = pool
        .enroll(
            EnrollmentRequest {
                email: req.email,
                company_name: req.company_name,
                category_id: req.category_id,
                message: req.message,
            },
            None,
        )
        .await?;
    enrollment_receipt(pool, entry.id).await
}

/// Current standing of one entry.
pub async fn enrollment_receipt<S, N>(
    pool: &WaitlistPool<S, N>,
    entry_id: EntryId,
) -> Result<EnrollmentReceipt, ApiError>
where
    S: WaitlistStore,
    N: Notifier,
{
    let entry = pool.waitlist().entry(entry_id).await?;
    let rank = match entry.status {
        WaitlistStatus::Waiting => Some(pool.store().waiting_rank(entry.position).await?),
        _ => None,
    };
    Ok(EnrollmentReceipt {
        entry_id: entry.id,
        position: entry.position,
        rank,
        status: entry.status,
        expires_at: entry.expires_at,
    })
}

/// Complete registration through the link in an offer.
///
/// A lapsed or withdrawn offer is reported as [`ApiErrorCode::Conflict`].
pub async fn complete_registration<S, N>(
    pool: &WaitlistPool<S, N>,
    entry_id: EntryId,
) -> Result<RegistrationReceipt, ApiError>
where
    S: WaitlistStore,
    N: Notifier,
{
    match pool.register(entry_id, None).await? {
        Outcome::Applied(admission) => Ok(RegistrationReceipt {
            member_id: admission.member.id,
            slot_number: admission.member.slot_number,
            entry_id: admission.entry.id,
        }),
        Outcome::AlreadyHandled => Err(ApiError::new(
            ApiErrorCode::Conflict,
            "this offer is no longer open",
        )),
    }
}

/// Admin listing of entries with ranks.
pub async fn list_waitlist<S, N>(
    pool: &WaitlistPool<S, N>,
    query: &WaitlistQuery,
) -> Result<Vec<EntryView>, ApiError>
where
    S: WaitlistStore,
    N: Notifier,
{
    let status = query
        .status
        .as_deref()
        .map(str::parse::<WaitlistStatus>)
        .transpose()
        .map_err(|e| ApiError::new(ApiErrorCode::Validation, e.to_string()))?;
    let filter = EntryFilter {
        status,
        category_id: query.category_id,
    };
    Ok(pool
        .waitlist()
        .list(&filter)
        .await?
        .into_iter()
        .map(EntryView::from)
        .collect())
}

/// Return a health payload; `ok` is false when the store does not answer.
pub async fn health<S, N>(pool: &WaitlistPool<S, N>) -> Health
where
    S: WaitlistStore,
    N: Notifier,
{
    let ok = match pool.get_status().await {
        Ok(_) => true,
        Err(err) => {
            tracing::warn!(error = %err, "health check could not reach the store");
            false
        }
    };
    Health {
        ok,
        capacity: pool.store().capacity(),
    }
}
