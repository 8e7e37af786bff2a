//! Builders that turn configuration into a running pool.

pub mod pool_builder;

pub use pool_builder::{build_pool, connect_postgres, in_memory_store};
