//! Member admission and deactivation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::model::{Admission, CategoryId, EntryId, Member, MemberId, NewMember};
use crate::core::store::WaitlistStore;
use crate::core::{Outcome, WaitlistError};
use crate::util::clock::Clock;
use crate::util::validation::{normalize_email, require_text, MAX_COMPANY_NAME_LEN};

/// Direct admission request (admin approval while slots are free).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionRequest {
    /// Contact email.
    pub email: String,
    /// Company name.
    pub company_name: String,
    /// Member category.
    pub category_id: CategoryId,
}

/// Member admission and deactivation.
pub struct Membership<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S> Clone for Membership<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S: WaitlistStore> Membership<S> {
    /// Create over `store`.
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Admit a member into the smallest free slot.
    ///
    /// Slots promised to an outstanding offer are not free for this path. Fails
    /// with [`WaitlistError::PoolFull`] when no unpromised slot is left at commit
    /// time.
    pub async fn admit(
        &self,
        request: AdmissionRequest,
        actor: Option<String>,
    ) -> Result<Member, WaitlistError> {
        let new_member = NewMember {
            email: normalize_email(&request.email)?,
            company_name: require_text("company_name", &request.company_name, MAX_COMPANY_NAME_LEN)?,
            category_id: request.category_id,
            actor,
        };
        if self.store.category(new_member.category_id).await?.is_none() {
            return Err(WaitlistError::Validation(format!(
                "unknown category {}",
                new_member.category_id
            )));
        }

        let member = self.store.insert_member(new_member, self.clock.now()).await?;
        tracing::info!(
            member_id = %member.id,
            slot = member.slot_number,
            "member admitted"
        );
        Ok(member)
    }

    /// Complete registration for a notified applicant: promote the entry, claim
    /// a slot, and create the member in one transaction.
    ///
    /// `AlreadyHandled` means the offer lapsed or was withdrawn first and no
    /// member exists; the registration flow must abort.
    pub async fn register(
        &self,
        entry_id: EntryId,
        actor: Option<String>,
    ) -> Result<Outcome<Admission>, WaitlistError> {
        let outcome = self
            .store
            .promote_and_admit(entry_id, actor, self.clock.now())
            .await?;
        match &outcome {
            Outcome::Applied(admission) => tracing::info!(
                %entry_id,
                member_id = %admission.member.id,
                slot = admission.member.slot_number,
                "applicant registered from waitlist"
            ),
            Outcome::AlreadyHandled => {
                tracing::debug!(%entry_id, "registration refused: offer no longer open");
            }
        }
        Ok(outcome)
    }

    /// Deactivate a member and release its slot.
    ///
    /// The caller should cascade afterwards so the slot is offered onward.
    pub async fn deactivate(
        &self,
        member_id: MemberId,
        actor: Option<String>,
    ) -> Result<Outcome<Member>, WaitlistError> {
        let outcome = self
            .store
            .deactivate_member(member_id, actor, self.clock.now())
            .await?;
        match &outcome {
            Outcome::Applied(member) => tracing::info!(
                %member_id,
                released_slot = member.slot_number,
                "member deactivated"
            ),
            Outcome::AlreadyHandled => {
                tracing::debug!(%member_id, "deactivate skipped: member already inactive");
            }
        }
        Ok(outcome)
    }

    /// Look up a member.
    pub async fn member(&self, member_id: MemberId) -> Result<Member, WaitlistError> {
        self.store
            .member(member_id)
            .await?
            .ok_or_else(|| WaitlistError::NotFound(format!("member {member_id}")))
    }

    /// Active members ordered by slot.
    pub async fn active_members(&self) -> Result<Vec<Member>, WaitlistError> {
        self.store.active_members().await
    }
}
