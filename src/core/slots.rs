//! Slot number assignment.

use crate::core::model::CapacitySnapshot;
use crate::core::WaitlistError;

/// Who is asking for a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotClaim {
    /// A notified applicant registering against their offer.
    Offer,
    /// An admin admitting someone who never queued.
    Direct,
}

impl SlotClaim {
    /// Slots this claimant may take.
    ///
    /// An offer holder may take any free slot. A direct admission may only take
    /// a slot that is not promised to an outstanding offer.
    #[must_use]
    pub const fn open_slots(self, snapshot: &CapacitySnapshot) -> u32 {
        match self {
            Self::Offer => snapshot.available_slots,
            Self::Direct => snapshot.unoffered_slots(),
        }
    }
}

/// Picks the smallest slot number in `1..=capacity` not held by an active member.
///
/// Stores call [`SlotAllocator::assign_slot`] inside the transaction that
/// activates the member, after confirming a free slot exists in that same
/// transaction. The scan is linear in `capacity`; past a few thousand slots a
/// free-list table would replace it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotAllocator {
    capacity: u32,
}

impl SlotAllocator {
    /// Allocator for a pool of `capacity` slots.
    #[must_use]
    pub const fn new(capacity: u32) -> Self {
        Self { capacity }
    }

    /// Configured capacity.
    #[must_use]
    pub const fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Whether `slot` lies in `1..=capacity`.
    #[must_use]
    pub const fn in_range(&self, slot: u32) -> bool {
        slot >= 1 && slot <= self.capacity
    }

    /// Smallest slot not in `used`.
    ///
    /// Out-of-range numbers in `used` are ignored. Finding no free slot means
    /// the caller's availability check and the member table disagree, which is
    /// an invariant violation reported as [`WaitlistError::CapacityExhausted`].
    pub fn assign_slot<I>(&self, used: I) -> Result<u32, WaitlistError>
    where
        I: IntoIterator<Item = u32>,
    {
        let mut taken = vec![false; self.capacity as usize + 1];
        for slot in used {
            if self.in_range(slot) {
                taken[slot as usize] = true;
            }
        }

        (1..=self.capacity)
            .find(|slot| !taken[*slot as usize])
            .ok_or_else(|| {
                tracing::error!(
                    capacity = self.capacity,
                    "slot allocation found no free slot after a passed availability check"
                );
                WaitlistError::CapacityExhausted {
                    capacity: self.capacity,
                }
            })
    }
}
