//! Waitlist pool facade.
//!
//! Wires one store, notifier, and clock into the components and exposes the
//! composite steps the scheduler and the registration flow need.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::audit::AuditLog;
use crate::core::capacity::CapacityTracker;
use crate::core::lifecycle::{LifecycleSettings, NotificationLifecycle, NotifyReceipt};
use crate::core::membership::{AdmissionRequest, Membership};
use crate::core::model::{
    Admission, CapacitySnapshot, EntryId, Member, MemberId, WaitlistEntry,
};
use crate::core::notifier::Notifier;
use crate::core::store::WaitlistStore;
use crate::core::waitlist::{EnrollmentRequest, WaitlistQueue};
use crate::core::{Outcome, WaitlistError};
use crate::util::clock::Clock;

/// What one sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Offers that lapsed.
    pub expired: Vec<WaitlistEntry>,
    /// Offers sent to fill freed slots.
    pub notified: Vec<NotifyReceipt>,
}

impl SweepReport {
    /// Whether the sweep changed nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.expired.is_empty() && self.notified.is_empty()
    }
}

/// Capacity-capped membership pool with a FIFO waitlist.
///
/// Holds no mutable state of its own: every count is read from the store inside
/// the transaction that needs it, so any number of pools over the same store
/// may run concurrently.
pub struct WaitlistPool<S, N> {
    store: Arc<S>,
    capacity: CapacityTracker<S>,
    waitlist: WaitlistQueue<S>,
    lifecycle: NotificationLifecycle<S, N>,
    membership: Membership<S>,
    audit: AuditLog<S>,
}

impl<S, N> WaitlistPool<S, N>
where
    S: WaitlistStore,
    N: Notifier,
{
    /// Create a new pool from components.
    pub fn new(
        store: Arc<S>,
        notifier: Arc<N>,
        clock: Arc<dyn Clock>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            capacity: CapacityTracker::new(Arc::clone(&store)),
            waitlist: WaitlistQueue::new(Arc::clone(&store), Arc::clone(&clock)),
            lifecycle: NotificationLifecycle::new(
                Arc::clone(&store),
                notifier,
                Arc::clone(&clock),
                settings,
            ),
            membership: Membership::new(Arc::clone(&store), clock),
            audit: AuditLog::new(Arc::clone(&store)),
            store,
        }
    }

    /// Underlying store.
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Occupancy queries.
    pub const fn capacity(&self) -> &CapacityTracker<S> {
        &self.capacity
    }

    /// Enrollment and listing.
    pub const fn waitlist(&self) -> &WaitlistQueue<S> {
        &self.waitlist
    }

    /// Offer state machine.
    pub const fn lifecycle(&self) -> &NotificationLifecycle<S, N> {
        &self.lifecycle
    }

    /// Member admission and deactivation.
    pub const fn membership(&self) -> &Membership<S> {
        &self.membership
    }

    /// Audit trail reader.
    pub const fn audit(&self) -> &AuditLog<S> {
        &self.audit
    }

    /// Current occupancy.
    pub async fn get_status(&self) -> Result<CapacitySnapshot, WaitlistError> {
        self.capacity.get_status().await
    }

    /// Enroll an applicant.
    pub async fn enroll(
        &self,
        request: EnrollmentRequest,
        actor: Option<String>,
    ) -> Result<WaitlistEntry, WaitlistError> {
        self.waitlist.enroll(request, actor).await
    }

    /// Admit a member directly.
    pub async fn admit(
        &self,
        request: AdmissionRequest,
        actor: Option<String>,
    ) -> Result<Member, WaitlistError> {
        self.membership.admit(request, actor).await
    }

    /// Registration against a notified entry: promote it and create its member
    /// in one transaction.
    pub async fn register(
        &self,
        entry_id: EntryId,
        actor: Option<String>,
    ) -> Result<Outcome<Admission>, WaitlistError> {
        self.membership.register(entry_id, actor).await
    }

    /// Deactivate a member and offer the freed slot onward.
    pub async fn deactivate_and_cascade(
        &self,
        member_id: MemberId,
        actor: Option<String>,
    ) -> Result<(Outcome<Member>, Vec<NotifyReceipt>), WaitlistError> {
        let outcome = self.membership.deactivate(member_id, actor).await?;
        let notified = self.lifecycle.cascade().await?;
        Ok((outcome, notified))
    }

    /// Cancel an entry and, if it held an offer, pass the offer on.
    pub async fn cancel_and_cascade(
        &self,
        entry_id: EntryId,
        actor: Option<String>,
    ) -> Result<(Outcome<WaitlistEntry>, Vec<NotifyReceipt>), WaitlistError> {
        let outcome = self.lifecycle.cancel(entry_id, actor).await?;
        let notified = self.lifecycle.cascade().await?;
        Ok((outcome, notified))
    }

    /// Fill free slots with offers.
    pub async fn cascade(&self) -> Result<Vec<NotifyReceipt>, WaitlistError> {
        self.lifecycle.cascade().await
    }

    /// Scheduler step: expire lapsed offers, then fill free slots.
    pub async fn sweep(&self) -> Result<SweepReport, WaitlistError> {
        let expired = self.lifecycle.expire_overdue().await?;
        let notified = self.lifecycle.cascade().await?;
        Ok(SweepReport { expired, notified })
    }
}
