//! Periodic expiry sweep on the tokio runtime.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::core::{Notifier, WaitlistPool, WaitlistStore};

/// Background task that calls [`WaitlistPool::sweep`] on a fixed interval.
///
/// The first sweep runs immediately. Dropping the sweeper signals shutdown
/// without waiting; call [`ExpirySweeper::shutdown`] to wait for the loop.
pub struct ExpirySweeper {
    shutdown_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl ExpirySweeper {
    /// Start sweeping `pool` every `interval` on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime, or if `interval` is zero.
    pub fn spawn<S, N>(pool: Arc<WaitlistPool<S, N>>, interval: Duration) -> Self
    where
        S: WaitlistStore,
        N: Notifier,
    {
        Self::spawn_on(&tokio::runtime::Handle::current(), pool, interval)
    }

    /// Start sweeping on the given runtime.
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero.
    pub fn spawn_on<S, N>(
        runtime: &tokio::runtime::Handle,
        pool: Arc<WaitlistPool<S, N>>,
        interval: Duration,
    ) -> Self
    where
        S: WaitlistStore,
        N: Notifier,
    {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(interval_secs = interval.as_secs(), "expiry sweeper started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => run_sweep(&pool).await,
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::info!("expiry sweeper stopped");
        });
        Self {
            shutdown_tx,
            handle: Some(handle),
        }
    }

    /// Whether the background loop is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the loop and wait for the in-flight sweep to finish.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                tracing::error!(error = %err, "expiry sweeper task failed");
            }
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

async fn run_sweep<S, N>(pool: &WaitlistPool<S, N>)
where
    S: WaitlistStore,
    N: Notifier,
{
    match pool.sweep().await {
        Ok(report) if report.is_empty() => tracing::debug!("sweep found nothing to do"),
        Ok(report) => tracing::info!(
            expired = report.expired.len(),
            notified = report.notified.len(),
            "sweep completed"
        ),
        Err(err) if err.is_retryable() => {
            tracing::warn!(error = %err, "sweep failed; retrying next tick");
        }
        Err(err) => tracing::error!(error = %err, "sweep failed"),
    }
}
