//! Waitlist domain: records, the offer state machine, and capacity accounting.

pub mod audit;
pub mod capacity;
pub mod error;
pub mod lifecycle;
pub mod membership;
pub mod model;
pub mod notifier;
pub mod pool;
pub mod slots;
pub mod status;
pub mod store;
pub mod waitlist;

pub use audit::{
    build_audit_entry, AuditAction, AuditLog, AuditLogEntry, AuditQuery, AuditSubject,
};
pub use capacity::CapacityTracker;
pub use error::{AppResult, Outcome, WaitlistError};
pub use lifecycle::{LifecycleSettings, NotificationLifecycle, NotifyReceipt};
pub use membership::{AdmissionRequest, Membership};
pub use model::{
    Admission, CapacitySnapshot, Category, CategoryId, EntryFilter, EntryId, Member, MemberId,
    NewEntry, NewMember, PoolCounts, RankedEntry, WaitlistEntry,
};
pub use notifier::{DeliveryStatus, NotificationRequest, Notifier, NotifyError};
pub use pool::{SweepReport, WaitlistPool};
pub use slots::{SlotAllocator, SlotClaim};
pub use status::{Transition, WaitlistStatus};
pub use store::{TransitionRequest, WaitlistStore};
pub use waitlist::{EnrollmentRequest, WaitlistQueue};
