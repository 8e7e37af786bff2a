//! Error types for waitlist and membership operations.

use thiserror::Error;

/// Errors produced by waitlist components.
///
/// A status-conditioned update that finds nothing to change is not an error;
/// see [`Outcome::AlreadyHandled`].
#[derive(Debug, Error)]
pub enum WaitlistError {
    /// Input rejected before any mutation (unknown category, malformed email, missing field).
    #[error("validation failed: {0}")]
    Validation(String),
    /// The email is already an active member or holds a non-terminal waitlist entry.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Every slot is taken.
    #[error("pool is full ({capacity} slots)")]
    PoolFull {
        /// Configured capacity.
        capacity: u32,
    },
    /// No entry or member with the given identifier.
    #[error("not found: {0}")]
    NotFound(String),
    /// Slot claim found no free number although the availability check passed.
    #[error("capacity exhausted: no free slot in 1..={capacity} after a passed availability check")]
    CapacityExhausted {
        /// Configured capacity.
        capacity: u32,
    },
    /// Store unreachable or transaction failure.
    #[error("storage error: {0}")]
    Storage(String),
}

impl WaitlistError {
    /// Whether the caller may retry the same request unchanged.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Whether the error is caused by the request itself and safe to show to the caller.
    #[must_use]
    pub const fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::Conflict(_) | Self::PoolFull { .. } | Self::NotFound(_)
        )
    }
}

impl From<sqlx::Error> for WaitlistError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return Self::Conflict(format!(
                    "unique constraint `{}` violated",
                    db.constraint().unwrap_or("unknown")
                ));
            }
        }
        Self::Storage(err.to_string())
    }
}

/// Result of a status-conditioned transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The row matched the expected state and was updated.
    Applied(T),
    /// A concurrent caller already moved the row out of the expected state.
    AlreadyHandled,
}

impl<T> Outcome<T> {
    /// Whether the transition was applied by this caller.
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    /// Applied value, if any.
    pub fn applied(self) -> Option<T> {
        match self {
            Self::Applied(value) => Some(value),
            Self::AlreadyHandled => None,
        }
    }

    /// Map the applied value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Applied(value) => Outcome::Applied(f(value)),
            Self::AlreadyHandled => Outcome::AlreadyHandled,
        }
    }
}

impl<T> From<Option<T>> for Outcome<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::AlreadyHandled, Self::Applied)
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
