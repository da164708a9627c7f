//! Typed error handling for relay operations.
//!
//! Intake failures surface synchronously to the caller. Everything after a
//! record is enqueued is reported through record status instead, so the only
//! post-enqueue error a caller ever sees is [`RelayError::Fatal`] from the
//! service supervisor.

use relay_common::DeliveryStatus;
use relay_store::{RecordId, StoreError, TransitionError};
use relay_transport::TransportError;
use thiserror::Error;

/// Caller-facing relay error.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Malformed input rejected before anything was persisted.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The batch exceeds the configured cap; nothing was enqueued.
    #[error("Batch of {size} destinations exceeds the maximum of {max}")]
    BatchTooLarge { size: usize, max: usize },

    #[error("Record not found: {0}")]
    NotFound(RecordId),

    #[error("Record {0} was already delivered")]
    AlreadyDelivered(RecordId),

    #[error("Record {id} has used all {max_retries} retries")]
    RetryLimitExceeded { id: RecordId, max_retries: u32 },

    #[error("Record {id} is {status}; only FAILED records can be retried")]
    NotRetryable { id: RecordId, status: DeliveryStatus },

    /// Publish or connect failure that may succeed later.
    #[error("Transport error: {0}")]
    Transport(#[source] TransportError),

    /// The transport gave up; the relay cannot make progress without a restart.
    #[error("Relay transport failed permanently: {0}")]
    Fatal(#[source] TransportError),

    #[error("Store error: {0}")]
    Store(#[source] StoreError),

    /// An inbound device report could not be parsed.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Relay service is already running")]
    AlreadyRunning,

    #[error("Relay service is not running")]
    NotRunning,
}

impl RelayError {
    /// Returns `true` if the caller's request was at fault.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::BatchTooLarge { .. }
                | Self::NotFound(_)
                | Self::AlreadyDelivered(_)
                | Self::RetryLimitExceeded { .. }
                | Self::NotRetryable { .. }
        )
    }

    /// Returns `true` if the relay must be restarted by its supervisor.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }
}

impl From<TransportError> for RelayError {
    fn from(error: TransportError) -> Self {
        if error.is_fatal() {
            Self::Fatal(error)
        } else {
            Self::Transport(error)
        }
    }
}

/// Store refusals map onto the caller-facing taxonomy; anything else is internal.
impl From<StoreError> for RelayError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(id) => Self::NotFound(id),
            StoreError::Transition { id, source } => match source {
                TransitionError::AlreadyDelivered => Self::AlreadyDelivered(id),
                TransitionError::RetryLimitExceeded { max_retries, .. } => {
                    Self::RetryLimitExceeded { id, max_retries }
                }
                TransitionError::NotRetryable(status) => Self::NotRetryable { id, status },
                source @ TransitionError::Invalid { .. } => {
                    Self::Store(StoreError::Transition { id, source })
                }
            },
            other => Self::Store(other),
        }
    }
}

/// Intake validation failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid destination: {0:?}")]
    InvalidDestination(String),

    #[error("Message payload is empty")]
    EmptyPayload,
}

/// Malformed payload on an inbound topic.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Missing field {field} in {payload:?}")]
    MissingField {
        field: &'static str,
        payload: String,
    },

    #[error("Unknown device status {0:?}")]
    UnknownStatus(String),
}
