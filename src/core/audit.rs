//! Append-only audit trail of capacity-affecting actions.
//!
//! Stores write entries inside the transaction that performs the action, so an
//! entry exists if and only if its action committed. This module holds the entry
//! type, the helper that builds entries from a post-mutation snapshot, and the
//! read-side query facade.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::model::{CapacitySnapshot, CategoryId, EntryId, MemberId};
use crate::core::store::WaitlistStore;
use crate::core::{Transition, WaitlistError};

/// Action recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Applicant joined the waitlist.
    Enrolled,
    /// Applicant was offered a slot.
    Notified,
    /// Applicant claimed the slot and became a member.
    Promoted,
    /// Offer lapsed.
    Expired,
    /// Applicant left the waitlist.
    Cancelled,
    /// Member admitted directly.
    MemberAdmitted,
    /// Member deactivated; slot released.
    MemberDeactivated,
}

impl AuditAction {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Enrolled => "enrolled",
            Self::Notified => "notified",
            Self::Promoted => "promoted",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
            Self::MemberAdmitted => "member_admitted",
            Self::MemberDeactivated => "member_deactivated",
        }
    }

    /// Parse the storage representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        [
            Self::Enrolled,
            Self::Notified,
            Self::Promoted,
            Self::Expired,
            Self::Cancelled,
            Self::MemberAdmitted,
            Self::MemberDeactivated,
        ]
        .into_iter()
        .find(|action| action.as_str() == s)
    }
}

impl From<Transition> for AuditAction {
    fn from(transition: Transition) -> Self {
        match transition {
            Transition::Notify => Self::Notified,
            Transition::Promote => Self::Promoted,
            Transition::Expire => Self::Expired,
            Transition::Cancel => Self::Cancelled,
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    /// Entry identifier.
    pub id: Uuid,
    /// Action taken.
    pub action: AuditAction,
    /// Occupancy right after the action.
    pub snapshot: CapacitySnapshot,
    /// Category involved, if any.
    pub category_id: Option<CategoryId>,
    /// Waitlist entry involved, if any.
    pub related_entry_id: Option<EntryId>,
    /// Member involved, if any.
    pub related_member_id: Option<MemberId>,
    /// Who triggered the action (`None` for system actions such as expiry).
    pub actor: Option<String>,
    /// Action-specific detail.
    pub metadata: Option<serde_json::Value>,
    /// Commit time.
    pub created_at: DateTime<Utc>,
}

/// Subjects an audit entry refers to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditSubject {
    /// Category involved.
    pub category_id: Option<CategoryId>,
    /// Waitlist entry involved.
    pub entry_id: Option<EntryId>,
    /// Member involved.
    pub member_id: Option<MemberId>,
    /// Who triggered the action.
    pub actor: Option<String>,
}

/// Helper to build an audit entry from context.
#[must_use]
pub fn build_audit_entry(
    action: AuditAction,
    snapshot: CapacitySnapshot,
    subject: AuditSubject,
    metadata: Option<serde_json::Value>,
    now: DateTime<Utc>,
) -> AuditLogEntry {
    AuditLogEntry {
        id: Uuid::new_v4(),
        action,
        snapshot,
        category_id: subject.category_id,
        related_entry_id: subject.entry_id,
        related_member_id: subject.member_id,
        actor: subject.actor,
        metadata,
        created_at: now,
    }
}

/// Query parameters for audit listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditQuery {
    /// Maximum rows returned, newest first.
    pub limit: usize,
    /// Only this action.
    pub action: Option<AuditAction>,
    /// Only entries about this waitlist entry.
    pub entry_id: Option<EntryId>,
    /// Only entries about this member.
    pub member_id: Option<MemberId>,
}

impl Default for AuditQuery {
    fn default() -> Self {
        Self {
            limit: 100,
            action: None,
            entry_id: None,
            member_id: None,
        }
    }
}

impl AuditQuery {
    /// Whether `entry` passes the filters (limit not applied).
    #[must_use]
    pub fn matches(&self, entry: &AuditLogEntry) -> bool {
        self.action.is_none_or(|a| entry.action == a)
            && self.entry_id.is_none_or(|id| entry.related_entry_id == Some(id))
            && self.member_id.is_none_or(|id| entry.related_member_id == Some(id))
    }
}

/// Read side of the audit trail.
pub struct AuditLog<S> {
    store: Arc<S>,
}

impl<S> Clone for AuditLog<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: WaitlistStore> AuditLog<S> {
    /// Create a reader over `store`.
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Newest entries matching `query`.
    pub async fn recent(&self, query: &AuditQuery) -> Result<Vec<AuditLogEntry>, WaitlistError> {
        self.store.audit_entries(query).await
    }

    /// Full history of one waitlist entry, newest first.
    pub async fn for_entry(&self, entry_id: EntryId) -> Result<Vec<AuditLogEntry>, WaitlistError> {
        self.store
            .audit_entries(&AuditQuery {
                entry_id: Some(entry_id),
                limit: usize::MAX,
                ..AuditQuery::default()
            })
            .await
    }
}
