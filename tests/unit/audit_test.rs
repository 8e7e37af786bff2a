//! Tests for audit entries and queries

use chrono::Utc;
use prometheus_waitlist::core::{
    build_audit_entry, AuditAction, AuditQuery, AuditSubject, CapacitySnapshot, PoolCounts,
    Transition,
};
use uuid::Uuid;

fn snapshot() -> CapacitySnapshot {
    CapacitySnapshot::from_counts(
        3,
        PoolCounts {
            active_members: 2,
            waiting: 4,
            notified: 1,
        },
    )
}

#[test]
fn test_build_audit_entry_copies_subject() {
    let entry_id = Uuid::new_v4();
    let entry = build_audit_entry(
        AuditAction::Notified,
        snapshot(),
        AuditSubject {
            category_id: None,
            entry_id: Some(entry_id),
            member_id: None,
            actor: Some("scheduler".into()),
        },
        Some(serde_json::json!({ "from": "waiting" })),
        Utc::now(),
    );

    assert_eq!(entry.action, AuditAction::Notified);
    assert_eq!(entry.related_entry_id, Some(entry_id));
    assert_eq!(entry.actor.as_deref(), Some("scheduler"));
    assert_eq!(entry.snapshot.available_slots, 1);
    assert_eq!(entry.snapshot.waitlist_count, 5);
}

#[test]
fn test_query_filters() {
    let entry_id = Uuid::new_v4();
    let entry = build_audit_entry(
        AuditAction::Expired,
        snapshot(),
        AuditSubject {
            entry_id: Some(entry_id),
            ..AuditSubject::default()
        },
        None,
        Utc::now(),
    );

    assert!(AuditQuery::default().matches(&entry));
    assert!(AuditQuery {
        entry_id: Some(entry_id),
        action: Some(AuditAction::Expired),
        ..AuditQuery::default()
    }
    .matches(&entry));
    assert!(!AuditQuery {
        action: Some(AuditAction::Promoted),
        ..AuditQuery::default()
    }
    .matches(&entry));
    assert!(!AuditQuery {
        member_id: Some(Uuid::new_v4()),
        ..AuditQuery::default()
    }
    .matches(&entry));
}

#[test]
fn test_action_names_round_trip_through_parse() {
    for transition in [
        Transition::Notify,
        Transition::Promote,
        Transition::Expire,
        Transition::Cancel,
    ] {
        let action = AuditAction::from(transition);
        assert_eq!(AuditAction::parse(action.as_str()), Some(action));
    }
    assert_eq!(AuditAction::parse("member_deactivated"), Some(AuditAction::MemberDeactivated));
    assert_eq!(AuditAction::parse("bogus"), None);
}
