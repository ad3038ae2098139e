//! Error types for the reconciler crate.

use thiserror::Error;

use crate::context::CancelCause;
use crate::reconciler::LifecycleState;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciler error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The operation is not valid in the current lifecycle state.
    #[error("cannot {operation}, reconciler is {state}")]
    InvalidState {
        operation: &'static str,
        state: LifecycleState,
    },

    /// The operation raced a shutdown of the reconciliation worker.
    #[error("stopped concurrently while {during}")]
    StoppedConcurrently { during: &'static str },

    /// The resource generator failed.
    #[error("failed to generate resources for worker configuration: {reason}")]
    Generation { reason: String },

    /// The apply port failed.
    #[error("failed to apply resources for worker configuration: {reason}")]
    Apply { reason: String },

    /// The caller's context fired while waiting.
    #[error("{cause} while {during}")]
    Cancelled {
        cause: CancelCause,
        during: &'static str,
    },

    /// Invalid reconciler setup.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// The cluster configuration could not be taken.
    #[error(transparent)]
    Config(#[from] cfgward_core::Error),
}

impl Error {
    /// Create an invalid state error.
    pub const fn invalid_state(operation: &'static str, state: LifecycleState) -> Self {
        Self::InvalidState { operation, state }
    }

    /// Create a stopped concurrently error.
    pub const fn stopped_concurrently(during: &'static str) -> Self {
        Self::StoppedConcurrently { during }
    }

    /// Create a generation error.
    pub fn generation(reason: impl Into<String>) -> Self {
        Self::Generation {
            reason: reason.into(),
        }
    }

    /// Create an apply error.
    pub fn apply(reason: impl Into<String>) -> Self {
        Self::Apply {
            reason: reason.into(),
        }
    }

    /// Create a cancellation error.
    pub const fn cancelled(cause: CancelCause, during: &'static str) -> Self {
        Self::Cancelled { cause, during }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Whether this error only reports a race with shutdown.
    pub const fn is_stopped_concurrently(&self) -> bool {
        matches!(self, Self::StoppedConcurrently { .. })
    }

    /// Rewrap a collaborator failure as a generation failure.
    pub(crate) fn into_generation(self) -> Self {
        match self {
            err @ Self::Generation { .. } => err,
            other => Self::generation(other.to_string()),
        }
    }

    /// Rewrap a collaborator failure as an apply failure.
    pub(crate) fn into_apply(self) -> Self {
        match self {
            err @ Self::Apply { .. } => err,
            other => Self::apply(other.to_string()),
        }
    }
}
