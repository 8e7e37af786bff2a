//! Tokio-side runtime pieces: the expiry sweeper and the API surface.

pub mod api;
pub mod sweeper;

pub use api::{
    complete_registration, enrollment_receipt, health, list_waitlist, status,
    submit_enrollment, ApiError, ApiErrorCode, EnrollmentReceipt, EnrollmentSubmission, EntryView, Health,
    RegistrationReceipt, StatusResponse, WaitlistQuery,
};
pub use sweeper::ExpirySweeper;
