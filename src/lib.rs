//! # Prometheus Waitlist
//!
//! A capacity-capped membership pool with a FIFO waitlist.
//!
//! The pool has a fixed number of slots. Applicants who arrive while it is full
//! enroll on a waitlist. When a slot frees up, the lowest-position waiting
//! applicant receives a time-limited offer; they either register and claim the
//! slot, let the offer lapse (the next applicant is offered instead), or
//! withdraw.
//!
//! ## Key Features
//!
//! - **Store as the only source of truth**: every count is recomputed inside the
//!   transaction that acts on it, so any number of workers can share one store
//! - **Explicit state machine**: `waiting → notified → promoted | expired`, with
//!   `cancelled` reachable from either open state
//! - **Idempotent transitions**: losing a race yields `Outcome::AlreadyHandled`,
//!   never an error
//! - **Commit, then notify**: a failing notifier never rolls back an offer
//! - **Audit trail**: every capacity-affecting action is logged atomically with
//!   a snapshot of the pool
//! - **Two backends**: in-memory for development and tests, Postgres (`sqlx`)
//!   for production
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use prometheus_waitlist::builders::build_pool;
//! use prometheus_waitlist::config::WaitlistConfig;
//! use prometheus_waitlist::infra::{InMemoryStore, TracingNotifier};
//! use prometheus_waitlist::runtime::ExpirySweeper;
//! use prometheus_waitlist::util::SystemClock;
//!
//! let cfg = WaitlistConfig::from_env()?;
//! let store = Arc::new(InMemoryStore::new(cfg.capacity));
//! let pool = Arc::new(build_pool(&cfg, store, Arc::new(TracingNotifier), Arc::new(SystemClock))?);
//! let sweeper = ExpirySweeper::spawn(Arc::clone(&pool), cfg.sweep_interval());
//! ```
//!
//! For complete scenarios, see `tests/waitlist_lifecycle_test.rs`.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Waitlist domain: records, the offer state machine, and capacity accounting.
pub mod core;
/// Configuration models for the pool, its store backend, and timeouts.
pub mod config;
/// Builders that turn configuration into a running pool.
pub mod builders;
/// Infrastructure adapters for stores and notifiers.
pub mod infra;
/// Tokio-side runtime pieces: the expiry sweeper and the API surface.
pub mod runtime;
/// Shared utilities.
pub mod util;
