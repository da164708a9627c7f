//! Delivery record and incoming message data model

use chrono::{DateTime, Utc};
use relay_common::DeliveryStatus;
use serde::{Deserialize, Serialize};

use crate::{RecordId, TransitionError};

/// Input for [`crate::RecordStore::create`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDeliveryRecord {
    /// Normalized recipient address
    pub destination: String,
    /// Text as it will be transmitted (already truncated)
    pub payload: String,
    /// Untruncated text, kept only when truncation happened
    pub original_payload: Option<String>,
    /// Requesting principal, opaque to the relay
    pub owner_id: String,
}

/// One requested send and its lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub id: RecordId,
    pub destination: String,
    pub payload: String,
    pub original_payload: Option<String>,
    pub status: DeliveryStatus,
    pub retry_count: u32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub owner_id: String,
}

/// A status change requested of the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The processor took the record off the queue.
    Dequeued,
    /// The device confirmed the send.
    Delivered,
    /// The device or the transport gave up.
    Failed { reason: String },
    /// A caller asked for another attempt.
    Retry { max_retries: u32 },
}

impl Transition {
    /// Status the record ends up in if the transition is accepted
    #[must_use]
    pub const fn target(&self) -> DeliveryStatus {
        match self {
            Self::Dequeued | Self::Retry { .. } => DeliveryStatus::Pending,
            Self::Delivered => DeliveryStatus::Sent,
            Self::Failed { .. } => DeliveryStatus::Failed,
        }
    }
}

impl DeliveryRecord {
    /// Build a freshly queued record
    #[must_use]
    pub fn queued(id: RecordId, new: NewDeliveryRecord, now: DateTime<Utc>) -> Self {
        Self {
            id,
            destination: new.destination,
            payload: new.payload,
            original_payload: new.original_payload,
            status: DeliveryStatus::Queued,
            retry_count: 0,
            error_message: None,
            created_at: now,
            updated_at: now,
            sent_at: None,
            owner_id: new.owner_id,
        }
    }

    /// Apply a transition in place.
    ///
    /// `SENT` is never overwritten, and `retry_count` never exceeds the budget the
    /// caller passes with [`Transition::Retry`]. A refused transition leaves the
    /// record untouched.
    pub fn apply(
        &mut self,
        transition: Transition,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if self.status.is_delivered() {
            return Err(TransitionError::AlreadyDelivered);
        }

        match transition {
            Transition::Dequeued => {
                if !self.status.awaits_confirmation() {
                    return Err(TransitionError::Invalid {
                        from: self.status,
                        to: DeliveryStatus::Pending,
                    });
                }
                self.status = DeliveryStatus::Pending;
            }
            Transition::Delivered => {
                if !self.status.awaits_confirmation() {
                    return Err(TransitionError::Invalid {
                        from: self.status,
                        to: DeliveryStatus::Sent,
                    });
                }
                self.status = DeliveryStatus::Sent;
                self.sent_at = Some(now);
                self.error_message = None;
            }
            Transition::Failed { reason } => {
                if !self.status.awaits_confirmation() {
                    return Err(TransitionError::Invalid {
                        from: self.status,
                        to: DeliveryStatus::Failed,
                    });
                }
                self.status = DeliveryStatus::Failed;
                self.error_message = Some(reason);
            }
            Transition::Retry { max_retries } => {
                if self.retry_count >= max_retries {
                    return Err(TransitionError::RetryLimitExceeded {
                        retry_count: self.retry_count,
                        max_retries,
                    });
                }
                if self.status != DeliveryStatus::Failed {
                    return Err(TransitionError::NotRetryable(self.status));
                }
                self.status = DeliveryStatus::Pending;
                self.retry_count += 1;
                self.error_message = None;
            }
        }

        self.updated_at = now;
        Ok(())
    }
}

/// How a device-supplied timestamp was interpreted
///
/// Devices may report either seconds since boot or wall-clock time and the
/// protocol does not say which. The value is kept for audit and never used for
/// ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceTimestamp {
    /// Small value, most likely seconds since the device booted
    SinceBoot { secs: u64 },
    /// Large value that parses as a wall-clock instant
    Absolute(DateTime<Utc>),
    /// Missing or not a number
    Unparseable(String),
}

/// A message the device received and reported to the relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingMessage {
    /// Sender address as reported by the device
    pub destination: String,
    pub text: String,
    /// Receipt time at the relay, the only trustworthy clock
    pub received_at: DateTime<Utc>,
    pub device_timestamp: DeviceTimestamp,
}
