//! Occupancy queries derived from the store.

use std::sync::Arc;

use crate::core::model::CapacitySnapshot;
use crate::core::store::WaitlistStore;
use crate::core::WaitlistError;

/// Stateless view over pool occupancy. Every call re-reads the store.
pub struct CapacityTracker<S> {
    store: Arc<S>,
}

impl<S> Clone for CapacityTracker<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: WaitlistStore> CapacityTracker<S> {
    /// Create a tracker over `store`.
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Current occupancy.
    pub async fn get_status(&self) -> Result<CapacitySnapshot, WaitlistError> {
        let counts = self.store.counts().await?;
        Ok(CapacitySnapshot::from_counts(self.store.capacity(), counts))
    }

    /// Whether at least one slot is free.
    ///
    /// Advisory only: admission re-checks inside its own transaction.
    pub async fn has_available_slot(&self) -> Result<bool, WaitlistError> {
        Ok(self.get_status().await?.available_slots > 0)
    }
}
