//! End-to-end lifecycle scenarios over the in-memory store.
//!
//! Covers:
//! 1. Direct admission fills slots in order and reports a full pool
//! 2. A freed slot is offered to the first waiting applicant for seven days
//! 3. Lapsed offers expire and cascade to the next applicant
//! 4. FIFO order across cancellations
//! 5. Stale transitions are no-ops, never errors
//! 6. Notifier failures never undo an offer
//! 7. Pool invariants after a mixed sequence of operations

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use prometheus_waitlist::core::{
    AdmissionRequest, AuditAction, AuditQuery, Category, DeliveryStatus, EnrollmentRequest,
    EntryFilter, LifecycleSettings, Outcome, WaitlistError, WaitlistPool, WaitlistStatus,
    WaitlistStore,
};
use prometheus_waitlist::infra::{InMemoryStore, RecordingNotifier};
use prometheus_waitlist::util::{Clock, ManualClock};
use uuid::Uuid;

struct Harness {
    pool: WaitlistPool<InMemoryStore, RecordingNotifier>,
    store: Arc<InMemoryStore>,
    notifier: Arc<RecordingNotifier>,
    clock: Arc<ManualClock>,
    category: Category,
}

fn harness_with(capacity: u32, settings: LifecycleSettings) -> Harness {
    let category = Category {
        id: Uuid::new_v4(),
        name: "Design Studios".into(),
    };
    let store = Arc::new(InMemoryStore::with_categories(capacity, [category.clone()]));
    let notifier = Arc::new(RecordingNotifier::new());
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
    ));
    let pool = WaitlistPool::new(
        Arc::clone(&store),
        Arc::clone(&notifier),
        Arc::clone(&clock) as Arc<dyn Clock>,
        settings,
    );
    Harness {
        pool,
        store,
        notifier,
        clock,
        category,
    }
}

fn harness(capacity: u32) -> Harness {
    harness_with(capacity, LifecycleSettings::default())
}

impl Harness {
    async fn admit(&self, email: &str) -> prometheus_waitlist::core::Member {
        self.pool
            .admit(
                AdmissionRequest {
                    email: email.into(),
                    company_name: format!("{email} Inc"),
                    category_id: self.category.id,
                },
                Some("admin".into()),
            )
            .await
            .unwrap()
    }

    async fn enroll(&self, email: &str) -> prometheus_waitlist::core::WaitlistEntry {
        self.pool
            .enroll(
                EnrollmentRequest {
                    email: email.into(),
                    company_name: format!("{email} Inc"),
                    category_id: self.category.id,
                    message: Some("Looking forward to it".into()),
                },
                None,
            )
            .await
            .unwrap()
    }

    async fn status_of(&self, id: Uuid) -> WaitlistStatus {
        self.pool.waitlist().entry(id).await.unwrap().status
    }

    async fn assert_invariants(&self) {
        let capacity = self.store.capacity();
        let active = self.store.active_members().await.unwrap();
        assert!(active.len() <= capacity as usize, "more members than slots");

        let slots: HashSet<u32> = active.iter().map(|m| m.slot_number).collect();
        assert_eq!(slots.len(), active.len(), "duplicate slot numbers");
        assert!(slots.iter().all(|s| (1..=capacity).contains(s)));

        let member_emails: HashSet<&str> = active.iter().map(|m| m.email.as_str()).collect();
        let open = self.store.all_entries();
        let open: Vec<_> = open.iter().filter(|e| e.status.holds_email()).collect();
        let open_emails: HashSet<&str> = open.iter().map(|e| e.email.as_str()).collect();
        assert_eq!(open_emails.len(), open.len(), "email on two open entries");
        assert!(
            member_emails.is_disjoint(&open_emails),
            "email held by a member and an open entry"
        );
    }
}

#[tokio::test]
async fn test_full_pool_offer_scenario() {
    let h = harness(2);
    let a = h.admit("a@studio.example").await;
    let b = h.admit("b@studio.example").await;
    assert_eq!((a.slot_number, b.slot_number), (1, 2));

    let status = h.pool.get_status().await.unwrap();
    assert_eq!(status.available_slots, 0);
    assert!(status.is_full);
    assert!(!h.pool.capacity().has_available_slot().await.unwrap());

    let c = h.enroll("c@studio.example").await;
    assert_eq!(c.status, WaitlistStatus::Waiting);
    assert_eq!(c.position, 1);

    h.pool.membership().deactivate(a.id, None).await.unwrap();
    let status = h.pool.get_status().await.unwrap();
    assert_eq!(status.available_slots, 1);
    assert!(!status.is_full);
    assert!(h.pool.capacity().has_available_slot().await.unwrap());

    let receipt = h
        .pool
        .lifecycle()
        .notify(c.id, Some("admin".into()))
        .await
        .unwrap()
        .applied()
        .unwrap();
    let now = h.clock.now();
    assert_eq!(receipt.entry.status, WaitlistStatus::Notified);
    assert_eq!(receipt.entry.notified_at, Some(now));
    assert_eq!(receipt.entry.expires_at, Some(now + chrono::Duration::days(7)));
    assert_eq!(receipt.delivery, DeliveryStatus::Delivered);

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].email, "c@studio.example");
    assert_eq!(sent[0].category_name, "Design Studios");
    assert_eq!(sent[0].rank, 1);
    assert!(sent[0].registration_url.ends_with(&format!("?entry={}", c.id)));

    let admission = h.pool.register(c.id, None).await.unwrap().applied().unwrap();
    assert_eq!(admission.member.slot_number, 1);
    assert_eq!(admission.entry.status, WaitlistStatus::Promoted);
    assert!(h.pool.get_status().await.unwrap().is_full);
    h.assert_invariants().await;
}

#[tokio::test]
async fn test_lapsed_offer_cascades_to_next_applicant() {
    let h = harness(1);
    let a = h.admit("a@studio.example").await;
    let c = h.enroll("c@studio.example").await;
    let d = h.enroll("d@studio.example").await;

    let (outcome, notified) = h.pool.deactivate_and_cascade(a.id, None).await.unwrap();
    assert!(outcome.is_applied());
    assert_eq!(notified.len(), 1);
    assert_eq!(notified[0].entry.id, c.id);
    assert_eq!(h.status_of(d.id).await, WaitlistStatus::Waiting);

    // Exactly at the deadline the offer is still open.
    h.clock.advance(chrono::Duration::days(7));
    let report = h.pool.sweep().await.unwrap();
    assert!(report.is_empty());

    h.clock.advance(chrono::Duration::seconds(1));
    let report = h.pool.sweep().await.unwrap();
    assert_eq!(report.expired.len(), 1);
    assert_eq!(report.expired[0].id, c.id);
    assert_eq!(report.notified.len(), 1);
    assert_eq!(report.notified[0].entry.id, d.id);

    assert_eq!(h.status_of(c.id).await, WaitlistStatus::Expired);
    assert_eq!(h.status_of(d.id).await, WaitlistStatus::Notified);

    // The expired applicant can no longer claim the slot.
    assert_eq!(h.pool.register(c.id, None).await.unwrap(), Outcome::AlreadyHandled);
    let admission = h.pool.register(d.id, None).await.unwrap().applied().unwrap();
    assert_eq!(admission.member.email, "d@studio.example");
    h.assert_invariants().await;
}

#[tokio::test]
async fn test_waiting_applicants_are_offered_in_enrollment_order() {
    let h = harness(1);
    let a = h.admit("a@studio.example").await;
    let mut entries = Vec::new();
    for i in 0..5 {
        entries.push(h.enroll(&format!("e{i}@studio.example")).await);
    }
    let positions: Vec<i64> = entries.iter().map(|e| e.position).collect();
    assert_eq!(positions, vec![1, 2, 3, 4, 5]);

    h.pool.deactivate_and_cascade(a.id, None).await.unwrap();
    // Each withdrawal passes the offer to the next in line.
    for entry in &entries[..4] {
        let (outcome, _) = h.pool.cancel_and_cascade(entry.id, None).await.unwrap();
        assert!(outcome.is_applied());
    }

    let order: Vec<String> = h.notifier.sent().into_iter().map(|r| r.email).collect();
    let expected: Vec<String> = (0..5).map(|i| format!("e{i}@studio.example")).collect();
    assert_eq!(order, expected);
    assert_eq!(h.status_of(entries[4].id).await, WaitlistStatus::Notified);
}

#[tokio::test]
async fn test_positions_survive_cancellation_and_reenrollment() {
    let h = harness(1);
    h.admit("a@studio.example").await;
    let first = h.enroll("x@studio.example").await;
    let second = h.enroll("y@studio.example").await;
    h.pool.lifecycle().cancel(first.id, None).await.unwrap();

    let again = h.enroll("x@studio.example").await;
    assert!(again.position > second.position);
    assert_eq!(h.pool.waitlist().rank(second.id).await.unwrap(), Some(1));
    assert_eq!(h.pool.waitlist().rank(again.id).await.unwrap(), Some(2));
    assert_eq!(h.pool.waitlist().rank(first.id).await.unwrap(), None);
}

#[tokio::test]
async fn test_expire_overdue_is_idempotent() {
    let h = harness(2);
    let c = h.enroll("c@studio.example").await;
    let d = h.enroll("d@studio.example").await;
    h.pool.cascade().await.unwrap();
    h.clock.advance(chrono::Duration::days(8));

    let first = h.pool.lifecycle().expire_overdue().await.unwrap();
    let after_first = h.store.all_entries();
    let second = h.pool.lifecycle().expire_overdue().await.unwrap();
    let after_second = h.store.all_entries();

    assert_eq!(first.len(), 2);
    assert!(second.is_empty());
    assert_eq!(after_first, after_second);
    assert_eq!(h.status_of(c.id).await, WaitlistStatus::Expired);
    assert_eq!(h.status_of(d.id).await, WaitlistStatus::Expired);
}

#[tokio::test]
async fn test_stale_transitions_are_no_ops() {
    let h = harness(1);
    let waiting = h.enroll("w@studio.example").await;

    // Promote only applies to notified entries.
    assert_eq!(
        h.pool.lifecycle().promote(waiting.id, None).await.unwrap(),
        Outcome::AlreadyHandled
    );
    assert!(h.store.all_members().is_empty());

    h.pool.lifecycle().cancel(waiting.id, None).await.unwrap();
    assert_eq!(
        h.pool.lifecycle().cancel(waiting.id, None).await.unwrap(),
        Outcome::AlreadyHandled
    );
    assert!(!h
        .pool
        .lifecycle()
        .notify(waiting.id, None)
        .await
        .unwrap()
        .is_applied());

    let err = h.pool.lifecycle().cancel(Uuid::new_v4(), None).await.unwrap_err();
    assert!(matches!(err, WaitlistError::NotFound(_)));
}

#[tokio::test]
async fn test_promote_and_register_share_one_path() {
    let h = harness(2);
    let c = h.enroll("c@studio.example").await;
    let d = h.enroll("d@studio.example").await;
    h.pool.cascade().await.unwrap();

    let via_lifecycle = h.pool.lifecycle().promote(c.id, None).await.unwrap();
    let via_register = h.pool.register(d.id, None).await.unwrap();
    let slots: Vec<u32> = [via_lifecycle, via_register]
        .into_iter()
        .map(|outcome| outcome.applied().unwrap().member.slot_number)
        .collect();
    assert_eq!(slots, vec![1, 2]);

    let recent = h.pool.audit().recent(&AuditQuery::default()).await.unwrap();
    assert_eq!(recent[0].action, AuditAction::Promoted);
    assert_eq!(recent[1].action, AuditAction::Promoted);
    assert_eq!(
        h.pool.lifecycle().promote(c.id, None).await.unwrap(),
        Outcome::AlreadyHandled
    );
}

#[tokio::test]
async fn test_lapsed_but_unswept_offer_cannot_be_claimed() {
    let h = harness(1);
    let c = h.enroll("c@studio.example").await;
    h.pool.cascade().await.unwrap();
    h.clock.advance(chrono::Duration::days(7) + chrono::Duration::minutes(1));

    assert_eq!(h.pool.register(c.id, None).await.unwrap(), Outcome::AlreadyHandled);
    assert!(h.store.all_members().is_empty());
    // Still notified until the sweep runs.
    assert_eq!(h.status_of(c.id).await, WaitlistStatus::Notified);
}

#[tokio::test]
async fn test_duplicate_enrollment_is_rejected() {
    let h = harness(1);
    h.admit("member@studio.example").await;
    h.enroll("applicant@studio.example").await;

    for email in ["member@studio.example", "Applicant@Studio.Example "] {
        let err = h
            .pool
            .enroll(
                EnrollmentRequest {
                    email: email.into(),
                    company_name: "Dup".into(),
                    category_id: h.category.id,
                    message: None,
                },
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WaitlistError::Conflict(_)), "{email}: {err}");
    }
    assert!(!h.pool.waitlist().can_enroll("member@studio.example").await.unwrap());
    assert!(h.pool.waitlist().can_enroll("new@studio.example").await.unwrap());
}

#[tokio::test]
async fn test_promoted_applicant_may_reenroll_after_leaving() {
    let h = harness(1);
    let c = h.enroll("c@studio.example").await;
    h.pool.cascade().await.unwrap();
    let admission = h.pool.register(c.id, None).await.unwrap().applied().unwrap();

    assert!(!h.pool.waitlist().can_enroll("c@studio.example").await.unwrap());
    h.pool
        .membership()
        .deactivate(admission.member.id, None)
        .await
        .unwrap();
    assert!(h.pool.waitlist().can_enroll("c@studio.example").await.unwrap());
}

#[tokio::test]
async fn test_enrollment_validation() {
    let h = harness(1);
    let cases = [
        ("not-an-email", "Acme", h.category.id),
        ("ok@studio.example", "   ", h.category.id),
        ("ok@studio.example", "Acme", Uuid::new_v4()),
    ];
    for (email, company, category_id) in cases {
        let err = h
            .pool
            .enroll(
                EnrollmentRequest {
                    email: email.into(),
                    company_name: company.into(),
                    category_id,
                    message: None,
                },
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WaitlistError::Validation(_)), "{err}");
    }
    assert!(h.store.all_entries().is_empty());
}

#[tokio::test]
async fn test_direct_admission_limits() {
    let h = harness(1);
    h.enroll("queued@studio.example").await;
    let err = h
        .pool
        .admit(
            AdmissionRequest {
                email: "queued@studio.example".into(),
                company_name: "Queued".into(),
                category_id: h.category.id,
            },
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WaitlistError::Conflict(_)));

    h.admit("a@studio.example").await;
    let err = h
        .pool
        .admit(
            AdmissionRequest {
                email: "b@studio.example".into(),
                company_name: "B".into(),
                category_id: h.category.id,
            },
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WaitlistError::PoolFull { capacity: 1 }));
}

#[tokio::test]
async fn test_direct_admission_cannot_take_an_offered_slot() {
    let h = harness(1);
    let a = h.admit("a@studio.example").await;
    let c = h.enroll("c@studio.example").await;
    let (_, notified) = h.pool.deactivate_and_cascade(a.id, None).await.unwrap();
    assert_eq!(notified.len(), 1);

    let err = h
        .pool
        .admit(
            AdmissionRequest {
                email: "walkin@studio.example".into(),
                company_name: "Walk-in".into(),
                category_id: h.category.id,
            },
            Some("admin".into()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, WaitlistError::PoolFull { capacity: 1 }));
    // The slot is free but promised.
    assert!(h.pool.capacity().has_available_slot().await.unwrap());

    let admission = h.pool.register(c.id, None).await.unwrap().applied().unwrap();
    assert_eq!(admission.member.slot_number, 1);
    assert_eq!(h.status_of(c.id).await, WaitlistStatus::Promoted);
    h.assert_invariants().await;
}

#[tokio::test]
async fn test_direct_admission_uses_slots_beyond_open_offers() {
    let h = harness(2);
    h.enroll("c@studio.example").await;
    h.pool.cascade().await.unwrap();
    let status = h.pool.get_status().await.unwrap();
    assert_eq!((status.available_slots, status.notified_count), (2, 1));

    let walkin = h.admit("walkin@studio.example").await;
    assert_eq!(walkin.slot_number, 1);
    assert!(h.pool.cascade().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_freed_slot_number_is_reused() {
    let h = harness(3);
    let a = h.admit("a@studio.example").await;
    let b = h.admit("b@studio.example").await;
    h.admit("c@studio.example").await;
    h.pool.membership().deactivate(b.id, None).await.unwrap();
    h.pool.membership().deactivate(a.id, None).await.unwrap();

    assert_eq!(h.admit("d@studio.example").await.slot_number, 1);
    assert_eq!(h.admit("e@studio.example").await.slot_number, 2);
    let members = h.pool.membership().active_members().await.unwrap();
    let slots: Vec<u32> = members.iter().map(|m| m.slot_number).collect();
    assert_eq!(slots, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_failed_delivery_keeps_offer() {
    let h = harness(1);
    let c = h.enroll("c@studio.example").await;
    h.notifier.set_failing(true);

    let receipts = h.pool.cascade().await.unwrap();
    assert_eq!(receipts.len(), 1);
    assert!(matches!(receipts[0].delivery, DeliveryStatus::Failed(_)));
    assert_eq!(h.status_of(c.id).await, WaitlistStatus::Notified);
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_slow_notifier_times_out_without_rollback() {
    let h = harness_with(
        1,
        LifecycleSettings {
            notifier_timeout: Duration::from_millis(50),
            ..LifecycleSettings::default()
        },
    );
    let c = h.enroll("c@studio.example").await;
    h.notifier.set_delay(Some(Duration::from_millis(500)));

    let receipts = h.pool.cascade().await.unwrap();
    assert_eq!(receipts[0].delivery, DeliveryStatus::TimedOut);
    assert_eq!(h.status_of(c.id).await, WaitlistStatus::Notified);
}

#[tokio::test]
async fn test_cascade_fills_every_free_slot_once() {
    let h = harness(3);
    for i in 0..5 {
        h.enroll(&format!("e{i}@studio.example")).await;
    }
    assert_eq!(h.pool.cascade().await.unwrap().len(), 3);
    assert!(h.pool.cascade().await.unwrap().is_empty());

    let status = h.pool.get_status().await.unwrap();
    assert_eq!(status.notified_count, 3);
    assert_eq!(status.waitlist_count, 5);
    assert_eq!(status.available_slots, 3);
}

#[tokio::test]
async fn test_listing_orders_by_status_then_position() {
    let h = harness(1);
    let e1 = h.enroll("e1@studio.example").await;
    let e2 = h.enroll("e2@studio.example").await;
    let e3 = h.enroll("e3@studio.example").await;
    h.pool.cascade().await.unwrap();
    h.pool.lifecycle().cancel(e2.id, None).await.unwrap();

    let all = h.pool.waitlist().list(&EntryFilter::default()).await.unwrap();
    let ids: Vec<Uuid> = all.iter().map(|r| r.entry.id).collect();
    assert_eq!(ids, vec![e3.id, e1.id, e2.id]);
    let ranks: Vec<Option<u32>> = all.iter().map(|r| r.rank).collect();
    assert_eq!(ranks, vec![Some(1), None, None]);

    let notified = h
        .pool
        .waitlist()
        .list(&EntryFilter {
            status: Some(WaitlistStatus::Notified),
            category_id: None,
        })
        .await
        .unwrap();
    assert_eq!(notified.len(), 1);
    assert_eq!(notified[0].entry.id, e1.id);
}

#[tokio::test]
async fn test_audit_trail_records_every_change() {
    let h = harness(1);
    let a = h.admit("a@studio.example").await;
    let c = h.enroll("c@studio.example").await;
    h.pool.deactivate_and_cascade(a.id, Some("admin".into())).await.unwrap();

    let recent = h.pool.audit().recent(&AuditQuery::default()).await.unwrap();
    let actions: Vec<AuditAction> = recent.iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![
            AuditAction::Notified,
            AuditAction::MemberDeactivated,
            AuditAction::Enrolled,
            AuditAction::MemberAdmitted,
        ]
    );
    assert_eq!(recent[0].snapshot.notified_count, 1);
    assert_eq!(recent[1].snapshot.available_slots, 1);
    assert_eq!(recent[1].actor.as_deref(), Some("admin"));

    let for_c = h.pool.audit().for_entry(c.id).await.unwrap();
    assert_eq!(for_c.len(), 2);
    assert!(for_c.iter().all(|e| e.related_entry_id == Some(c.id)));
}

#[tokio::test]
async fn test_storage_outage_surfaces_as_retryable() {
    let h = harness(1);
    h.store.set_available(false);
    let err = h.pool.get_status().await.unwrap_err();
    assert!(err.is_retryable());
    assert!(!err.is_user_facing());
}

#[tokio::test]
async fn test_mixed_sequence_preserves_invariants() {
    let h = harness(3);
    let mut members = Vec::new();
    for i in 0..3 {
        members.push(h.admit(&format!("m{i}@studio.example")).await);
    }
    let mut entries = Vec::new();
    for i in 0..6 {
        entries.push(h.enroll(&format!("w{i}@studio.example")).await);
    }
    h.assert_invariants().await;

    h.pool.deactivate_and_cascade(members[0].id, None).await.unwrap();
    h.pool.deactivate_and_cascade(members[1].id, None).await.unwrap();
    h.assert_invariants().await;

    h.pool.register(entries[0].id, None).await.unwrap();
    h.clock.advance(chrono::Duration::days(8));
    h.pool.sweep().await.unwrap();
    h.assert_invariants().await;

    h.pool.cancel_and_cascade(entries[3].id, None).await.unwrap();
    h.pool.register(entries[2].id, None).await.unwrap();
    h.pool.register(entries[4].id, None).await.unwrap();
    h.assert_invariants().await;

    let status = h.pool.get_status().await.unwrap();
    assert!(status.current_count <= status.total_capacity);
}
