//! Builders to construct the waitlist pool and its store from configuration.

use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use crate::config::{StoreBackendConfig, WaitlistConfig};
use crate::core::{AppResult, Notifier, WaitlistError, WaitlistPool, WaitlistStore};
use crate::infra::{InMemoryStore, PostgresStore};
use crate::util::clock::Clock;

/// Validate `cfg` and wire a pool over the given collaborators.
///
/// The store must have been built for the same capacity as `cfg`.
pub fn build_pool<S, N>(
    cfg: &WaitlistConfig,
    store: Arc<S>,
    notifier: Arc<N>,
    clock: Arc<dyn Clock>,
) -> Result<WaitlistPool<S, N>, WaitlistError>
where
    S: WaitlistStore,
    N: Notifier,
{
    cfg.validate()
        .map_err(|e| WaitlistError::Validation(format!("config invalid: {e}")))?;
    if store.capacity() != cfg.capacity {
        return Err(WaitlistError::Validation(format!(
            "store capacity {} does not match configured capacity {}",
            store.capacity(),
            cfg.capacity
        )));
    }

    tracing::info!(
        capacity = cfg.capacity,
        notification_window_secs = cfg.notification_window_secs,
        "waitlist pool configured"
    );
    Ok(WaitlistPool::new(
        store,
        notifier,
        clock,
        cfg.lifecycle_settings(),
    ))
}

/// Empty in-memory store sized from `cfg`.
#[must_use]
pub fn in_memory_store(cfg: &WaitlistConfig) -> InMemoryStore {
    InMemoryStore::new(cfg.capacity)
}

/// Connect to Postgres, apply migrations, and return the store.
///
/// Fails when `cfg` does not select the Postgres backend.
pub async fn connect_postgres(cfg: &WaitlistConfig) -> AppResult<PostgresStore> {
    cfg.validate().map_err(anyhow::Error::msg)?;
    let StoreBackendConfig::Postgres {
        database_url,
        max_connections,
    } = &cfg.store
    else {
        anyhow::bail!("store backend is not postgres");
    };

    let pool = PgPoolOptions::new()
        .max_connections(*max_connections)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")?;
    let store = PostgresStore::new(pool, cfg.capacity);
    store
        .migrate()
        .await
        .context("failed to apply waitlist migrations")?;

    tracing::info!(max_connections, "postgres store ready");
    Ok(store)
}
