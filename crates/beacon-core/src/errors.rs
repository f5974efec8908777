//! Unified error type for beacon operations
//!
//! The primitives themselves never fail on their own account: a rejected
//! `Var::update` hands the caller's error back untouched, and cancellation of
//! an aggregation wait is reported through the returned signal. `BeaconError`
//! covers everything layered on top (control loops, task supervision and
//! configuration).

use serde::{Deserialize, Serialize};

/// Unified error type for beacon operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum BeaconError {
    /// A wait was abandoned because its cancellation token fired
    #[error("Cancelled: {message}")]
    Cancelled {
        /// What was being waited for when cancellation arrived
        message: String,
    },

    /// Invalid input or configuration
    #[error("Invalid: {message}")]
    Invalid {
        /// Error message describing the invalid input
        message: String,
    },

    /// A user-supplied change handler failed
    #[error("Handler error: {message}")]
    Handler {
        /// Error message reported by the handler
        message: String,
    },

    /// Internal system error
    #[error("Internal error: {message}")]
    Internal {
        /// Error message describing the internal error
        message: String,
    },
}

impl BeaconError {
    /// Create a cancellation error
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled {
            message: message.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a handler error
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this error only reports a cooperative cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Result alias used across the workspace
pub type Result<T> = std::result::Result<T, BeaconError>;
