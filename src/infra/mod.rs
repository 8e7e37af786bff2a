//! Infrastructure adapters for stores and notifiers.

pub mod notifier;
pub mod store;

pub use notifier::{RecordingNotifier, TracingNotifier};
pub use store::{InMemoryStore, PostgresStore};
