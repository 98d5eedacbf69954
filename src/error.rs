//! Error types shared by the ranking core.
//!
//! Each concern gets its own enum so callers can tell fatal configuration
//! problems apart from faults the session absorbs and keeps running through.

use thiserror::Error;

use crate::state::ItemId;

/// Bad item set or engine settings. Fatal at `start()`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    /// Fewer than two unique items were supplied.
    #[error("at least 2 unique items are required (got {count})")]
    TooFewItems { count: usize },

    /// The same id was registered twice.
    #[error("duplicate item id: {0}")]
    DuplicateItem(ItemId),

    /// An engine setting is out of range.
    #[error("invalid setting `{field}`: {message}")]
    InvalidSetting {
        field: &'static str,
        message: String,
    },

    /// A config file could not be read or parsed.
    #[error("config file error: {0}")]
    File(String),
}

impl ConfigurationError {
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidSetting {
            field,
            message: message.into(),
        }
    }
}

/// A comparison that cannot be recorded. Rejected immediately; the session
/// continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidComparisonError {
    #[error("item cannot be compared with itself: {0}")]
    SelfComparison(ItemId),

    #[error("unknown item id: {0}")]
    UnknownItem(ItemId),

    /// The oracle named a winner that is not one of the two items it was shown.
    #[error("winner {winner} is not part of the pair ({a}, {b})")]
    WinnerNotInPair { winner: ItemId, a: ItemId, b: ItemId },
}

/// The Bradley-Terry fit failed. The driver keeps the last valid model.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelFitError {
    #[error("no convergence after {iterations} iterations (last delta {delta:.3e})")]
    NotConverged { iterations: usize, delta: f64 },

    #[error("non-finite strength for item {0}")]
    NonFinite(ItemId),

    #[error("comparison references unknown item {0}")]
    UnknownItem(ItemId),
}

/// A lifecycle call that does not apply in the current state.
///
/// These are reported, never raised: see [`crate::session::Transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("session has not been started")]
    NotStarted,

    #[error("session is already running")]
    AlreadyRunning,

    #[error("session is already paused")]
    AlreadyPaused,

    #[error("session is not paused")]
    NotPaused,

    #[error("session is already stopped")]
    AlreadyStopped,

    #[error("driver has already finished")]
    DriverFinished,
}
