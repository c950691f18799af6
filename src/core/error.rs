// ============================================================================
// spark-properties - Errors
// One error type for every fallible operation in the crate
// ============================================================================

use thiserror::Error;

use super::types::ListenerId;

/// Errors reported by emitters, properties and the bulk transaction
/// coordinator.
///
/// All of these are programming errors in the consuming code: they are
/// reported synchronously at the offending call and never retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PropertyError {
    /// Operation attempted on a disposed emitter or property
    #[error("{target} has been disposed")]
    Disposed { target: String },

    /// The listener is already registered
    #[error("{listener} is already registered on {target}")]
    DuplicateListener { target: String, listener: ListenerId },

    /// The listener is not registered
    #[error("{listener} is not registered on {target}")]
    UnknownListener { target: String, listener: ListenerId },

    /// Emission or configuration argument failed validation
    #[error("invalid argument for {target}: {reason}")]
    InvalidArgument { target: String, reason: String },

    /// Mutation attempted on a value that does not allow it
    #[error("invalid operation on {target}: {reason}")]
    InvalidOperation { target: String, reason: String },

    /// Deferred protocol used out of order
    #[error("invalid state of {target}: {reason}")]
    InvalidState { target: String, reason: String },

    /// Numeric value outside its inclusive range
    #[error("{value} is outside the range {range} of {target}")]
    OutOfRange {
        target: String,
        value: f64,
        range: String,
    },

    /// Numeric value does not match the declared number type
    #[error("{value} is not a valid {expected} value for {target}")]
    WrongNumberType {
        target: String,
        value: f64,
        expected: String,
    },

    /// Bulk transaction could not make progress
    #[error(
        "unsatisfiable order dependencies after {passes} passes; pending: [{}]; edges: [{}]",
        .pending.join(", "),
        .edges.join(", ")
    )]
    UnsatisfiableConstraints {
        passes: usize,
        pending: Vec<String>,
        edges: Vec<String>,
    },
}

impl PropertyError {
    pub(crate) fn disposed(target: impl Into<String>) -> Self {
        Self::Disposed {
            target: target.into(),
        }
    }

    pub(crate) fn invalid_argument(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            target: target.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_operation(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOperation {
            target: target.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_state(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidState {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// True for the deferred-protocol ordering failure
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState { .. })
    }
}

/// Result alias used throughout the crate
pub type Result<T, E = PropertyError> = std::result::Result<T, E>;

// =============================================================================
// TESTS
// =============================================================================
