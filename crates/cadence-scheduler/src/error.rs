//! Error types for the scheduler.

use thiserror::Error;

use crate::{CallbackError, TargetId};

/// Errors that can occur in scheduler operations.
///
/// Precondition variants are reported rather than returned by the
/// scheduling API; callback variants are logged at the dispatch site.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Target already has an update callback.
    #[error("update already scheduled for {0}, unschedule it first")]
    UpdateAlreadyScheduled(TargetId),

    /// Selector scheduled with a pause state different from its target's.
    #[error("{target} is scheduled with paused={existing}, cannot add a selector with paused={requested}")]
    PauseMismatch {
        target: TargetId,
        existing: bool,
        requested: bool,
    },

    /// Interval is negative or not finite.
    #[error("invalid interval {0}: intervals must be finite and non-negative")]
    InvalidInterval(f32),

    /// Tick delta is negative or not finite.
    #[error("invalid tick delta {0}: must be finite and non-negative")]
    InvalidDelta(f32),

    /// Time scale is negative or not finite.
    #[error("invalid time scale {0}: must be finite and non-negative")]
    InvalidTimeScale(f32),

    /// Catch-up policy allows no firings at all.
    #[error("invalid catch-up policy: max_fires must be at least 1")]
    InvalidCatchUp,

    /// `tick` was called from inside a callback it dispatched.
    #[error("re-entrant tick from inside a scheduled callback")]
    ReentrantTick,

    /// Shared scheduler was already created.
    #[error("shared scheduler already initialized")]
    AlreadyInitialized,

    /// Configuration could not be parsed.
    #[error("invalid scheduler config: {0}")]
    Config(#[from] serde_json::Error),

    /// Callback returned an error.
    #[error("callback `{selector}` for {target} failed: {source}")]
    Callback {
        target: TargetId,
        selector: String,
        #[source]
        source: CallbackError,
    },

    /// Callback panicked.
    #[error("callback `{selector}` for {target} panicked: {message}")]
    CallbackPanicked {
        target: TargetId,
        selector: String,
        message: String,
    },
}
