//! Shared utilities: time source, input validation, and tracing setup.

pub mod clock;
pub mod telemetry;
pub mod validation;

pub use clock::{Clock, ManualClock, SystemClock};
pub use telemetry::init_tracing;
pub use validation::{normalize_email, optional_text, require_text};
