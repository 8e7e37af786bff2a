//! Waitlist entry states and the transition table that governs them.
//!
//! ```text
//! WAITING ──notify──► NOTIFIED ──promote──► PROMOTED
//!    │                   │
//!    │                   └──expire───► EXPIRED
//!    └──cancel──► CANCELLED ◄──cancel──┘
//! ```
//!
//! Every status change in the stores goes through this table: the in-memory
//! store calls [`WaitlistEntry::apply`](crate::core::WaitlistEntry::apply), and
//! the Postgres store binds [`Transition::source_names`] and
//! [`Transition::target`] into its conditional updates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a waitlist entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitlistStatus {
    /// Enrolled, waiting for a slot.
    Waiting,
    /// Offered a slot; the notification window is running.
    Notified,
    /// Claimed the offered slot and became a member.
    Promoted,
    /// Let the notification window lapse.
    Expired,
    /// Withdrew or was removed.
    Cancelled,
}

impl WaitlistStatus {
    /// All states in lifecycle order. Admin listings sort by this order.
    pub const ALL: [Self; 5] = [
        Self::Waiting,
        Self::Notified,
        Self::Promoted,
        Self::Expired,
        Self::Cancelled,
    ];

    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Notified => "notified",
            Self::Promoted => "promoted",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }

    /// Terminal states accept no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Promoted | Self::Expired | Self::Cancelled)
    }

    /// Entries in these states hold their email against re-enrollment.
    #[must_use]
    pub const fn holds_email(self) -> bool {
        !self.is_terminal()
    }

    /// Position of the state in [`Self::ALL`].
    #[must_use]
    pub const fn sort_key(self) -> u8 {
        match self {
            Self::Waiting => 0,
            Self::Notified => 1,
            Self::Promoted => 2,
            Self::Expired => 3,
            Self::Cancelled => 4,
        }
    }

    /// Whether `transition` may start from this state.
    #[must_use]
    pub fn allows(self, transition: Transition) -> bool {
        transition.sources().contains(&self)
    }

    /// State reached by applying `transition`, or `None` if the table forbids it.
    #[must_use]
    pub fn apply(self, transition: Transition) -> Option<Self> {
        self.allows(transition).then(|| transition.target())
    }
}

impl fmt::Display for WaitlistStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown status string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown waitlist status `{0}`")]
pub struct UnknownStatus(pub String);

impl FromStr for WaitlistStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// A named edge in the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// Offer a freed slot.
    Notify,
    /// Claim the offered slot.
    Promote,
    /// Notification window lapsed.
    Expire,
    /// Withdraw from the waitlist.
    Cancel,
}

impl Transition {
    /// States from which the transition is legal.
    #[must_use]
    pub const fn sources(self) -> &'static [WaitlistStatus] {
        match self {
            Self::Notify => &[WaitlistStatus::Waiting],
            Self::Promote | Self::Expire => &[WaitlistStatus::Notified],
            Self::Cancel => &[WaitlistStatus::Waiting, WaitlistStatus::Notified],
        }
    }

    /// State the transition leads to.
    #[must_use]
    pub const fn target(self) -> WaitlistStatus {
        match self {
            Self::Notify => WaitlistStatus::Notified,
            Self::Promote => WaitlistStatus::Promoted,
            Self::Expire => WaitlistStatus::Expired,
            Self::Cancel => WaitlistStatus::Cancelled,
        }
    }

    /// Source states in storage representation, for `status = ANY($n)` filters.
    #[must_use]
    pub fn source_names(self) -> Vec<&'static str> {
        self.sources().iter().map(|s| s.as_str()).collect()
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Notify => "notify",
            Self::Promote => "promote",
            Self::Expire => "expire",
            Self::Cancel => "cancel",
        };
        f.write_str(name)
    }
}
