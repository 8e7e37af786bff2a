//! Records persisted by the store and the values derived from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::status::{Transition, WaitlistStatus};

/// Member category identifier.
pub type CategoryId = Uuid;
/// Waitlist entry identifier.
pub type EntryId = Uuid;
/// Member identifier.
pub type MemberId = Uuid;

/// A category applicants enroll under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Category identifier.
    pub id: CategoryId,
    /// Display name used in notifications.
    pub name: String,
}

/// An admitted member holding one slot while active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Member identifier.
    pub id: MemberId,
    /// Normalized email address.
    pub email: String,
    /// Company name.
    pub company_name: String,
    /// Category the member belongs to.
    pub category_id: CategoryId,
    /// Slot number in `1..=capacity`; released once the member is deactivated.
    pub slot_number: u32,
    /// Whether the member currently holds its slot.
    pub active: bool,
    /// Admission time.
    pub approved_at: DateTime<Utc>,
    /// Deactivation time, set once.
    pub deactivated_at: Option<DateTime<Utc>>,
}

/// A waitlist enrollment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitlistEntry {
    /// Entry identifier.
    pub id: EntryId,
    /// Normalized email address.
    pub email: String,
    /// Company name.
    pub company_name: String,
    /// Category the applicant enrolled under.
    pub category_id: CategoryId,
    /// Free-form note from the applicant.
    pub message: Option<String>,
    /// Monotonic sequence number fixed at enrollment; never renumbered.
    pub position: i64,
    /// Lifecycle state.
    pub status: WaitlistStatus,
    /// When the current offer was sent.
    pub notified_at: Option<DateTime<Utc>>,
    /// When the current offer lapses.
    pub expires_at: Option<DateTime<Utc>>,
    /// Enrollment time.
    pub created_at: DateTime<Utc>,
    /// Last transition time.
    pub updated_at: DateTime<Utc>,
}

impl WaitlistEntry {
    /// Whether the offer window has lapsed at `now`.
    #[must_use]
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status.allows(Transition::Expire) && self.expires_at.is_some_and(|at| at < now)
    }

    /// Move along `transition` at `now` and return the previous state.
    ///
    /// Returns `None` and leaves the entry untouched when the transition table
    /// does not allow it. Offer timestamps are the caller's to set.
    pub fn apply(&mut self, transition: Transition, now: DateTime<Utc>) -> Option<WaitlistStatus> {
        let target = self.status.apply(transition)?;
        let from = std::mem::replace(&mut self.status, target);
        self.updated_at = now;
        Some(from)
    }
}

/// Validated enrollment data handed to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    /// Normalized email address.
    pub email: String,
    /// Trimmed company name.
    pub company_name: String,
    /// Existing category.
    pub category_id: CategoryId,
    /// Optional trimmed note.
    pub message: Option<String>,
    /// Who requested the enrollment, for the audit trail.
    pub actor: Option<String>,
}

/// Validated direct-admission data handed to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMember {
    /// Normalized email address.
    pub email: String,
    /// Trimmed company name.
    pub company_name: String,
    /// Existing category.
    pub category_id: CategoryId,
    /// Who approved the admission.
    pub actor: Option<String>,
}

/// A member created by claiming an offered slot, together with the promoted entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Admission {
    /// The new member.
    pub member: Member,
    /// The entry, now `Promoted`.
    pub entry: WaitlistEntry,
}

/// Raw counts read from the store inside a transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolCounts {
    /// Active members.
    pub active_members: u32,
    /// Entries in `Waiting`.
    pub waiting: u32,
    /// Entries in `Notified`.
    pub notified: u32,
}

/// Derived view of pool occupancy. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacitySnapshot {
    /// Configured number of slots.
    pub total_capacity: u32,
    /// Active members.
    pub current_count: u32,
    /// Free slots.
    pub available_slots: u32,
    /// Non-terminal waitlist entries (waiting plus notified).
    pub waitlist_count: u32,
    /// Outstanding offers.
    pub notified_count: u32,
    /// No free slot remains.
    pub is_full: bool,
}

impl CapacitySnapshot {
    /// Derive a snapshot from raw counts.
    #[must_use]
    pub const fn from_counts(total_capacity: u32, counts: PoolCounts) -> Self {
        let available_slots = total_capacity.saturating_sub(counts.active_members);
        Self {
            total_capacity,
            current_count: counts.active_members,
            available_slots,
            waitlist_count: counts.waiting + counts.notified,
            notified_count: counts.notified,
            is_full: available_slots == 0,
        }
    }

    /// Free slots not already promised to a notified applicant.
    #[must_use]
    pub const fn unoffered_slots(&self) -> u32 {
        self.available_slots.saturating_sub(self.notified_count)
    }
}

/// Admin listing filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryFilter {
    /// Only entries in this state.
    pub status: Option<WaitlistStatus>,
    /// Only entries in this category.
    pub category_id: Option<CategoryId>,
}

impl EntryFilter {
    /// Whether `entry` passes the filter.
    #[must_use]
    pub fn matches(&self, entry: &WaitlistEntry) -> bool {
        self.status.is_none_or(|s| entry.status == s)
            && self.category_id.is_none_or(|c| entry.category_id == c)
    }
}

/// An entry paired with its derived rank among waiting entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedEntry {
    /// The entry.
    pub entry: WaitlistEntry,
    /// 1-based rank among `Waiting` entries; `None` for other states.
    pub rank: Option<u32>,
}
