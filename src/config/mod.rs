//! Configuration models for the pool, its store backend, and timeouts.

pub mod pool;

pub use pool::{StoreBackendConfig, WaitlistConfig};
