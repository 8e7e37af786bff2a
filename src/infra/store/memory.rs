//! In-memory store for development and tests.
//!
//! Each operation holds one mutex for its whole body, which gives the same
//! all-or-nothing behavior as a serializable transaction: every check runs
//! before any write, so an operation that fails leaves no trace.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::json;
use uuid::Uuid;

use crate::core::{
    build_audit_entry, Admission, AuditAction, AuditLogEntry, AuditQuery, AuditSubject,
    CapacitySnapshot, Category, CategoryId, EntryFilter, EntryId, Member, MemberId, NewEntry,
    NewMember, Outcome, PoolCounts, SlotAllocator, SlotClaim, Transition, TransitionRequest, WaitlistEntry,
    WaitlistError, WaitlistStatus, WaitlistStore,
};

#[derive(Default)]
struct State {
    categories: HashMap<CategoryId, Category>,
    members: Vec<Member>,
    /// Insertion order equals position order.
    entries: Vec<WaitlistEntry>,
    audit: Vec<AuditLogEntry>,
    last_position: i64,
}

impl State {
    fn counts(&self) -> PoolCounts {
        let count = |status: WaitlistStatus| {
            count_u32(self.entries.iter().filter(|e| e.status == status).count())
        };
        PoolCounts {
            active_members: count_u32(self.members.iter().filter(|m| m.active).count()),
            waiting: count(WaitlistStatus::Waiting),
            notified: count(WaitlistStatus::Notified),
        }
    }

    fn snapshot(&self, capacity: u32) -> CapacitySnapshot {
        CapacitySnapshot::from_counts(capacity, self.counts())
    }

    fn email_in_use(&self, email: &str) -> bool {
        self.members.iter().any(|m| m.active && m.email == email)
            || self
                .entries
                .iter()
                .any(|e| e.status.holds_email() && e.email == email)
    }

    fn entry_index(&self, id: EntryId) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }

    fn used_slots(&self) -> impl Iterator<Item = u32> + '_ {
        self.members
            .iter()
            .filter(|m| m.active)
            .map(|m| m.slot_number)
    }

    /// Checks shared by every path that activates a member.
    fn claim_slot(
        &self,
        capacity: u32,
        email: &str,
        claim: SlotClaim,
    ) -> Result<u32, WaitlistError> {
        if self.members.iter().any(|m| m.active && m.email == email) {
            return Err(WaitlistError::Conflict(format!(
                "{email} is already an active member"
            )));
        }
        if claim.open_slots(&self.snapshot(capacity)) == 0 {
            return Err(WaitlistError::PoolFull { capacity });
        }
        SlotAllocator::new(capacity).assign_slot(self.used_slots())
    }

    fn record(
        &mut self,
        capacity: u32,
        action: AuditAction,
        subject: AuditSubject,
        metadata: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) {
        let snapshot = self.snapshot(capacity);
        self.audit
            .push(build_audit_entry(action, snapshot, subject, metadata, now));
    }
}

fn count_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Single-process store keeping everything behind one mutex.
pub struct InMemoryStore {
    capacity: u32,
    state: Mutex<State>,
    available: AtomicBool,
}

impl InMemoryStore {
    /// Create an empty store for a pool of `capacity` slots.
    #[must_use]
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            state: Mutex::new(State::default()),
            available: AtomicBool::new(true),
        }
    }

    /// Create a store with `categories` already present.
    #[must_use]
    pub fn with_categories(capacity: u32, categories: impl IntoIterator<Item = Category>) -> Self {
        let store = Self::new(capacity);
        {
            let mut state = store.state.lock();
            for category in categories {
                state.categories.insert(category.id, category);
            }
        }
        store
    }

    /// Simulate an outage: while unavailable every operation fails with
    /// [`WaitlistError::Storage`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    /// Every entry ever created, in position order.
    #[must_use]
    pub fn all_entries(&self) -> Vec<WaitlistEntry> {
        self.state.lock().entries.clone()
    }

    /// Every member ever admitted, active or not.
    #[must_use]
    pub fn all_members(&self) -> Vec<Member> {
        self.state.lock().members.clone()
    }

    fn ensure_available(&self) -> Result<(), WaitlistError> {
        if self.available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(WaitlistError::Storage("in-memory store marked unavailable".into()))
        }
    }
}

#[async_trait]
impl WaitlistStore for InMemoryStore {
    fn capacity(&self) -> u32 {
        self.capacity
    }

    async fn counts(&self) -> Result<PoolCounts, WaitlistError> {
        self.ensure_available()?;
        Ok(self.state.lock().counts())
    }

    async fn upsert_category(&self, category: &Category) -> Result<(), WaitlistError> {
        self.ensure_available()?;
        self.state
            .lock()
            .categories
            .insert(category.id, category.clone());
        Ok(())
    }

    async fn category(&self, id: CategoryId) -> Result<Option<Category>, WaitlistError> {
        self.ensure_available()?;
        Ok(self.state.lock().categories.get(&id).cloned())
    }

    async fn email_in_use(&self, email: &str) -> Result<bool, WaitlistError> {
        self.ensure_available()?;
        Ok(self.state.lock().email_in_use(email))
    }

    async fn insert_entry(
        &self,
        entry: NewEntry,
        now: DateTime<Utc>,
    ) -> Result<WaitlistEntry, WaitlistError> {
        self.ensure_available()?;
        let mut state = self.state.lock();
        if !state.categories.contains_key(&entry.category_id) {
            return Err(WaitlistError::Validation(format!(
                "unknown category {}",
                entry.category_id
            )));
        }
        if state.email_in_use(&entry.email) {
            return Err(WaitlistError::Conflict(format!(
                "{} already holds a member slot or an open waitlist entry",
                entry.email
            )));
        }

        state.last_position += 1;
        let created = WaitlistEntry {
            id: Uuid::new_v4(),
            email: entry.email,
            company_name: entry.company_name,
            category_id: entry.category_id,
            message: entry.message,
            position: state.last_position,
            status: WaitlistStatus::Waiting,
            notified_at: None,
            expires_at: None,
            created_at: now,
            updated_at: now,
        };
        state.entries.push(created.clone());
        state.record(
            self.capacity,
            AuditAction::Enrolled,
            AuditSubject {
                category_id: Some(created.category_id),
                entry_id: Some(created.id),
                member_id: None,
                actor: entry.actor,
            },
            Some(json!({ "position": created.position })),
            now,
        );
        Ok(created)
    }

    async fn transition(
        &self,
        request: TransitionRequest,
    ) -> Result<Outcome<WaitlistEntry>, WaitlistError> {
        request.check()?;
        self.ensure_available()?;
        let mut state = self.state.lock();
        let idx = state
            .entry_index(request.entry_id)
            .ok_or_else(|| WaitlistError::NotFound(format!("waitlist entry {}", request.entry_id)))?;
        let entry = &mut state.entries[idx];
        let Some(from) = entry.apply(request.transition, request.now) else {
            return Ok(Outcome::AlreadyHandled);
        };
        if request.transition == Transition::Notify {
            entry.notified_at = Some(request.now);
            entry.expires_at = request.expires_at;
        }
        let updated = entry.clone();

        state.record(
            self.capacity,
            request.transition.into(),
            AuditSubject {
                category_id: Some(updated.category_id),
                entry_id: Some(updated.id),
                member_id: None,
                actor: request.actor,
            },
            Some(json!({ "from": from, "expires_at": updated.expires_at })),
            request.now,
        );
        Ok(Outcome::Applied(updated))
    }

    async fn notify_next(
        &self,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<WaitlistEntry>, WaitlistError> {
        self.ensure_available()?;
        let mut state = self.state.lock();
        if state.snapshot(self.capacity).unoffered_slots() == 0 {
            return Ok(None);
        }
        // Entries are stored in position order, so the first waiting one is next.
        let Some(idx) = state
            .entries
            .iter()
            .position(|e| e.status.allows(Transition::Notify))
        else {
            return Ok(None);
        };

        let entry = &mut state.entries[idx];
        let Some(from) = entry.apply(Transition::Notify, now) else {
            return Ok(None);
        };
        entry.notified_at = Some(now);
        entry.expires_at = Some(expires_at);
        let updated = entry.clone();

        state.record(
            self.capacity,
            AuditAction::Notified,
            AuditSubject {
                category_id: Some(updated.category_id),
                entry_id: Some(updated.id),
                member_id: None,
                actor: None,
            },
            Some(json!({ "from": from, "expires_at": expires_at })),
            now,
        );
        Ok(Some(updated))
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<Vec<WaitlistEntry>, WaitlistError> {
        self.ensure_available()?;
        let mut state = self.state.lock();
        let mut expired = Vec::new();
        for entry in state.entries.iter_mut().filter(|e| e.is_overdue(now)) {
            if entry.apply(Transition::Expire, now).is_some() {
                expired.push(entry.clone());
            }
        }
        for entry in &expired {
            state.record(
                self.capacity,
                AuditAction::Expired,
                AuditSubject {
                    category_id: Some(entry.category_id),
                    entry_id: Some(entry.id),
                    member_id: None,
                    actor: None,
                },
                Some(json!({ "expires_at": entry.expires_at })),
                now,
            );
        }
        Ok(expired)
    }

    async fn promote_and_admit(
        &self,
        entry_id: EntryId,
        actor: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Outcome<Admission>, WaitlistError> {
        self.ensure_available()?;
        let mut state = self.state.lock();
        let idx = state
            .entry_index(entry_id)
            .ok_or_else(|| WaitlistError::NotFound(format!("waitlist entry {entry_id}")))?;
        let entry = &state.entries[idx];
        if !entry.status.allows(Transition::Promote) || entry.is_overdue(now) {
            return Ok(Outcome::AlreadyHandled);
        }
        let email = entry.email.clone();
        let slot_number = state.claim_slot(self.capacity, &email, SlotClaim::Offer)?;

        let entry = &mut state.entries[idx];
        if entry.apply(Transition::Promote, now).is_none() {
            return Ok(Outcome::AlreadyHandled);
        }
        let promoted = entry.clone();

        let member = Member {
            id: Uuid::new_v4(),
            email,
            company_name: promoted.company_name.clone(),
            category_id: promoted.category_id,
            slot_number,
            active: true,
            approved_at: now,
            deactivated_at: None,
        };
        state.members.push(member.clone());
        state.record(
            self.capacity,
            AuditAction::Promoted,
            AuditSubject {
                category_id: Some(promoted.category_id),
                entry_id: Some(promoted.id),
                member_id: Some(member.id),
                actor,
            },
            Some(json!({ "slot_number": slot_number })),
            now,
        );
        Ok(Outcome::Applied(Admission {
            member,
            entry: promoted,
        }))
    }

    async fn insert_member(
        &self,
        member: NewMember,
        now: DateTime<Utc>,
    ) -> Result<Member, WaitlistError> {
        self.ensure_available()?;
        let mut state = self.state.lock();
        if !state.categories.contains_key(&member.category_id) {
            return Err(WaitlistError::Validation(format!(
                "unknown category {}",
                member.category_id
            )));
        }
        if state
            .entries
            .iter()
            .any(|e| e.status.holds_email() && e.email == member.email)
        {
            return Err(WaitlistError::Conflict(format!(
                "{} has an open waitlist entry; register through the waitlist",
                member.email
            )));
        }
        let slot_number = state.claim_slot(self.capacity, &member.email, SlotClaim::Direct)?;

        let created = Member {
            id: Uuid::new_v4(),
            email: member.email,
            company_name: member.company_name,
            category_id: member.category_id,
            slot_number,
            active: true,
            approved_at: now,
            deactivated_at: None,
        };
        state.members.push(created.clone());
        state.record(
            self.capacity,
            AuditAction::MemberAdmitted,
            AuditSubject {
                category_id: Some(created.category_id),
                entry_id: None,
                member_id: Some(created.id),
                actor: member.actor,
            },
            Some(json!({ "slot_number": slot_number })),
            now,
        );
        Ok(created)
    }

    async fn deactivate_member(
        &self,
        member_id: MemberId,
        actor: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Outcome<Member>, WaitlistError> {
        self.ensure_available()?;
        let mut state = self.state.lock();
        let member = state
            .members
            .iter_mut()
            .find(|m| m.id == member_id)
            .ok_or_else(|| WaitlistError::NotFound(format!("member {member_id}")))?;
        if !member.active {
            return Ok(Outcome::AlreadyHandled);
        }
        member.active = false;
        member.deactivated_at = Some(now);
        let deactivated = member.clone();

        state.record(
            self.capacity,
            AuditAction::MemberDeactivated,
            AuditSubject {
                category_id: Some(deactivated.category_id),
                entry_id: None,
                member_id: Some(deactivated.id),
                actor,
            },
            Some(json!({ "released_slot": deactivated.slot_number })),
            now,
        );
        Ok(Outcome::Applied(deactivated))
    }

    async fn entry(&self, id: EntryId) -> Result<Option<WaitlistEntry>, WaitlistError> {
        self.ensure_available()?;
        let state = self.state.lock();
        Ok(state.entry_index(id).map(|idx| state.entries[idx].clone()))
    }

    async fn member(&self, id: MemberId) -> Result<Option<Member>, WaitlistError> {
        self.ensure_available()?;
        Ok(self
            .state
            .lock()
            .members
            .iter()
            .find(|m| m.id == id)
            .cloned())
    }

    async fn active_members(&self) -> Result<Vec<Member>, WaitlistError> {
        self.ensure_available()?;
        let mut members: Vec<Member> = self
            .state
            .lock()
            .members
            .iter()
            .filter(|m| m.active)
            .cloned()
            .collect();
        members.sort_by_key(|m| m.slot_number);
        Ok(members)
    }

    async fn entries(&self, filter: &EntryFilter) -> Result<Vec<WaitlistEntry>, WaitlistError> {
        self.ensure_available()?;
        let mut entries: Vec<WaitlistEntry> = self
            .state
            .lock()
            .entries
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        entries.sort_by_key(|e| (e.status.sort_key(), e.position));
        Ok(entries)
    }

    async fn waiting_rank(&self, position: i64) -> Result<u32, WaitlistError> {
        self.ensure_available()?;
        let ahead = self
            .state
            .lock()
            .entries
            .iter()
            .filter(|e| e.status == WaitlistStatus::Waiting && e.position < position)
            .count();
        Ok(count_u32(ahead) + 1)
    }

    async fn audit_entries(&self, query: &AuditQuery) -> Result<Vec<AuditLogEntry>, WaitlistError> {
        self.ensure_available()?;
        Ok(self
            .state
            .lock()
            .audit
            .iter()
            .rev()
            .filter(|e| query.matches(e))
            .take(query.limit)
            .cloned()
            .collect())
    }
}
