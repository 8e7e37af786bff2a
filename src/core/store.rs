//! Persistence abstraction.
//!
//! Every method is one transaction: checks, writes, and the matching audit entry
//! commit together or not at all. Stale status-conditioned updates come back as
//! [`Outcome::AlreadyHandled`], never as errors.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::core::audit::{AuditLogEntry, AuditQuery};
use crate::core::model::{
    Admission, Category, CategoryId, EntryFilter, EntryId, Member, MemberId, NewEntry, NewMember,
    PoolCounts, WaitlistEntry,
};
use crate::core::{Outcome, Transition, WaitlistError};

/// Single-entry transition handed to [`WaitlistStore::transition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRequest {
    /// Target entry.
    pub entry_id: EntryId,
    /// Edge to apply.
    pub transition: Transition,
    /// Transaction time.
    pub now: DateTime<Utc>,
    /// Offer deadline; required for [`Transition::Notify`].
    pub expires_at: Option<DateTime<Utc>>,
    /// Who requested the transition.
    pub actor: Option<String>,
}

impl TransitionRequest {
    /// Offer a slot until `expires_at`.
    #[must_use]
    pub const fn notify(
        entry_id: EntryId,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        actor: Option<String>,
    ) -> Self {
        Self {
            entry_id,
            transition: Transition::Notify,
            now,
            expires_at: Some(expires_at),
            actor,
        }
    }

    /// Withdraw the entry.
    #[must_use]
    pub const fn cancel(entry_id: EntryId, now: DateTime<Utc>, actor: Option<String>) -> Self {
        Self {
            entry_id,
            transition: Transition::Cancel,
            now,
            expires_at: None,
            actor,
        }
    }

    /// Reject transitions a single-row update cannot express.
    ///
    /// Promotion must create a member in the same transaction and expiry is a
    /// batch sweep, so both have dedicated store methods.
    pub fn check(&self) -> Result<(), WaitlistError> {
        match self.transition {
            Transition::Notify if self.expires_at.is_none() => Err(WaitlistError::Validation(
                "notify requires an expiry time".into(),
            )),
            Transition::Notify | Transition::Cancel => Ok(()),
            Transition::Promote | Transition::Expire => Err(WaitlistError::Validation(format!(
                "{} is not a single-entry transition",
                self.transition
            ))),
        }
    }
}

/// Transactional store for members, waitlist entries, categories, and the audit log.
#[async_trait]
pub trait WaitlistStore: Send + Sync + 'static {
    /// Fixed number of slots.
    fn capacity(&self) -> u32;

    /// Current occupancy counts.
    async fn counts(&self) -> Result<PoolCounts, WaitlistError>;

    /// Create or rename a category.
    async fn upsert_category(&self, category: &Category) -> Result<(), WaitlistError>;

    /// Look up a category.
    async fn category(&self, id: CategoryId) -> Result<Option<Category>, WaitlistError>;

    /// Whether `email` belongs to an active member or a waiting/notified entry.
    async fn email_in_use(&self, email: &str) -> Result<bool, WaitlistError>;

    /// Enroll a new `Waiting` entry at `max(position) + 1`.
    ///
    /// Fails with [`WaitlistError::Conflict`] if the email is in use when the
    /// transaction runs.
    async fn insert_entry(
        &self,
        entry: NewEntry,
        now: DateTime<Utc>,
    ) -> Result<WaitlistEntry, WaitlistError>;

    /// Apply a notify or cancel transition conditioned on the current status.
    async fn transition(
        &self,
        request: TransitionRequest,
    ) -> Result<Outcome<WaitlistEntry>, WaitlistError>;

    /// Notify the lowest-position waiting entry if a free slot has no outstanding offer.
    async fn notify_next(
        &self,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<WaitlistEntry>, WaitlistError>;

    /// Move every notified entry whose offer lapsed before `now` to `Expired`.
    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<Vec<WaitlistEntry>, WaitlistError>;

    /// Promote a notified entry, claim a slot, and create its member.
    ///
    /// Claims with [`SlotClaim::Offer`](crate::core::SlotClaim::Offer).
    async fn promote_and_admit(
        &self,
        entry_id: EntryId,
        actor: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Outcome<Admission>, WaitlistError>;

    /// Admit a member directly, claiming the smallest free slot.
    ///
    /// Claims with [`SlotClaim::Direct`](crate::core::SlotClaim::Direct): slots
    /// on offer to notified entries are off limits.
    async fn insert_member(
        &self,
        member: NewMember,
        now: DateTime<Utc>,
    ) -> Result<Member, WaitlistError>;

    /// Deactivate a member, releasing its slot.
    async fn deactivate_member(
        &self,
        member_id: MemberId,
        actor: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Outcome<Member>, WaitlistError>;

    /// Look up an entry.
    async fn entry(&self, id: EntryId) -> Result<Option<WaitlistEntry>, WaitlistError>;

    /// Look up a member.
    async fn member(&self, id: MemberId) -> Result<Option<Member>, WaitlistError>;

    /// Active members ordered by slot number.
    async fn active_members(&self) -> Result<Vec<Member>, WaitlistError>;

    /// Entries matching `filter`, ordered by (status lifecycle order, position).
    async fn entries(&self, filter: &EntryFilter) -> Result<Vec<WaitlistEntry>, WaitlistError>;

    /// Number of waiting entries with a lower position, plus one.
    async fn waiting_rank(&self, position: i64) -> Result<u32, WaitlistError>;

    /// Audit entries matching `query`, newest first.
    async fn audit_entries(&self, query: &AuditQuery) -> Result<Vec<AuditLogEntry>, WaitlistError>;
}
