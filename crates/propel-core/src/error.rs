//! Error types for the driving engine.

use crate::ids::EventId;

/// Errors surfaced by the driving engine.
///
/// Most misconfiguration is handled by logging and substituting a safe
/// default; this enum covers the cases that must reach the caller: lifecycle
/// misuse of the event table, queries against an unbuilt path, and spline
/// builds that fail to converge.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum DriveError {
    /// An event id was used that is not present in the table. This is a
    /// lifecycle bug in the caller, not a recoverable runtime condition.
    #[error("Unknown event id: {0:?}")]
    UnknownEvent(EventId),

    /// A path was queried before a successful build, or after a mutation
    /// with auto-build disabled.
    #[error("Path is not built: {reason}")]
    PathNotBuilt { reason: String },

    /// A path needs at least two waypoints to be built.
    #[error("Path has too few waypoints: {count}")]
    TooFewWaypoints { count: usize },

    /// Iterative segment-length refinement exceeded its wall-clock budget.
    #[error("Spline build did not converge within {timeout_ms} ms")]
    BuildTimeout { timeout_ms: u64 },

    /// Target binding could not be produced by an external binding adapter.
    #[error("Binding failed: {0}")]
    Binding(#[from] crate::bind::BindingError),
}

/// Result type used throughout the crate.
pub type Result<T> = core::result::Result<T, DriveError>;
