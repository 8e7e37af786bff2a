//! Notifier backends.

pub mod log;
pub mod memory;

pub use log::TracingNotifier;
pub use memory::RecordingNotifier;
