//! Error types for the relay-store crate.

use relay_common::DeliveryStatus;
use thiserror::Error;

use crate::RecordId;

/// Top-level store error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record with this identifier.
    #[error("Record not found: {0}")]
    NotFound(RecordId),

    /// The status guard refused the requested transition.
    #[error("Transition refused for {id}: {source}")]
    Transition {
        id: RecordId,
        #[source]
        source: TransitionError,
    },

    /// Internal error (lock poisoning, capacity exhaustion, etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Reasons a record refuses a status change.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransitionError {
    /// The record is `SENT`; nothing may overwrite it.
    #[error("record already delivered")]
    AlreadyDelivered,

    /// The application-level retry budget is spent.
    #[error("retry limit exceeded ({retry_count}/{max_retries})")]
    RetryLimitExceeded { retry_count: u32, max_retries: u32 },

    /// Only `FAILED` records can be retried.
    #[error("cannot retry a record in state {0}")]
    NotRetryable(DeliveryStatus),

    /// The state machine has no such edge.
    #[error("invalid transition from {from} to {to}")]
    Invalid {
        from: DeliveryStatus,
        to: DeliveryStatus,
    },
}

/// Specialized `Result` type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::Internal(format!("Lock poisoned: {e}"))
    }
}

impl StoreError {
    /// The transition refusal behind this error, if that is what it is.
    #[must_use]
    pub const fn transition(&self) -> Option<&TransitionError> {
        match self {
            Self::Transition { source, .. } => Some(source),
            _ => None,
        }
    }
}
