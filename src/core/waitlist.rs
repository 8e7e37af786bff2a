//! Enrollment, duplicate prevention, and FIFO ordering.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::model::{
    CategoryId, EntryFilter, EntryId, NewEntry, RankedEntry, WaitlistEntry,
};
use crate::core::status::WaitlistStatus;
use crate::core::store::WaitlistStore;
use crate::core::WaitlistError;
use crate::util::clock::Clock;
use crate::util::validation::{
    normalize_email, optional_text, require_text, MAX_COMPANY_NAME_LEN, MAX_MESSAGE_LEN,
};

/// Applicant-supplied enrollment data, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentRequest {
    /// Contact email.
    pub email: String,
    /// Company name.
    pub company_name: String,
    /// Category to enroll under.
    pub category_id: CategoryId,
    /// Optional note.
    #[serde(default)]
    pub message: Option<String>,
}

/// The FIFO waitlist.
pub struct WaitlistQueue<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S> Clone for WaitlistQueue<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S: WaitlistStore> WaitlistQueue<S> {
    /// Create the queue over `store`.
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Whether `email` may enroll: it is neither an active member nor held by a
    /// waiting or notified entry.
    pub async fn can_enroll(&self, email: &str) -> Result<bool, WaitlistError> {
        let email = normalize_email(email)?;
        Ok(!self.store.email_in_use(&email).await?)
    }

    /// Validate and enroll an applicant at the back of the queue.
    pub async fn enroll(
        &self,
        request: EnrollmentRequest,
        actor: Option<String>,
    ) -> Result<WaitlistEntry, WaitlistError> {
        let new_entry = NewEntry {
            email: normalize_email(&request.email)?,
            company_name: require_text("company_name", &request.company_name, MAX_COMPANY_NAME_LEN)?,
            category_id: request.category_id,
            message: optional_text("message", request.message.as_deref(), MAX_MESSAGE_LEN)?,
            actor,
        };

        if self.store.category(new_entry.category_id).await?.is_none() {
            return Err(WaitlistError::Validation(format!(
                "unknown category {}",
                new_entry.category_id
            )));
        }
        if self.store.email_in_use(&new_entry.email).await? {
            return Err(duplicate(&new_entry.email));
        }

        // The store re-checks the email inside its transaction; a concurrent
        // enrollment of the same address surfaces here as a conflict.
        let email = new_entry.email.clone();
        let entry = self
            .store
            .insert_entry(new_entry, self.clock.now())
            .await
            .map_err(|err| match err {
                WaitlistError::Conflict(_) => {
                    tracing::debug!(error = %err, "enrollment lost a duplicate race");
                    duplicate(&email)
                }
                other => other,
            })?;

        tracing::info!(
            entry_id = %entry.id,
            position = entry.position,
            category_id = %entry.category_id,
            "applicant enrolled on waitlist"
        );
        Ok(entry)
    }

    /// Look up one entry.
    pub async fn entry(&self, entry_id: EntryId) -> Result<WaitlistEntry, WaitlistError> {
        self.store
            .entry(entry_id)
            .await?
            .ok_or_else(|| WaitlistError::NotFound(format!("waitlist entry {entry_id}")))
    }

    /// 1-based rank among waiting entries; `None` once the entry has left `Waiting`.
    pub async fn rank(&self, entry_id: EntryId) -> Result<Option<u32>, WaitlistError> {
        let entry = self.entry(entry_id).await?;
        if entry.status != WaitlistStatus::Waiting {
            return Ok(None);
        }
        self.store.waiting_rank(entry.position).await.map(Some)
    }

    /// Entries matching `filter`, ordered by (status, position), with ranks.
    ///
    /// Ranks are global across categories: a category filter narrows the rows,
    /// not the ordering they are ranked in.
    pub async fn list(&self, filter: &EntryFilter) -> Result<Vec<RankedEntry>, WaitlistError> {
        let entries = self.store.entries(filter).await?;

        let ranks: HashMap<EntryId, u32> = if entries
            .iter()
            .any(|e| e.status == WaitlistStatus::Waiting)
        {
            let waiting = self
                .store
                .entries(&EntryFilter {
                    status: Some(WaitlistStatus::Waiting),
                    category_id: None,
                })
                .await?;
            waiting
                .iter()
                .zip(1u32..)
                .map(|(entry, rank)| (entry.id, rank))
                .collect()
        } else {
            HashMap::new()
        };

        Ok(entries
            .into_iter()
            .map(|entry| RankedEntry {
                rank: ranks.get(&entry.id).copied(),
                entry,
            })
            .collect())
    }
}

fn duplicate(email: &str) -> WaitlistError {
    WaitlistError::Conflict(format!(
        "{email} is already a member or already on the waitlist"
    ))
}
