use core::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle of a delivery record.
///
/// ```text
/// QUEUED --(dequeued, publish ok)--> PENDING
/// PENDING --(device SENT)----------> SENT      [terminal]
/// PENDING --(device FAILED | publish exhausted)--> FAILED
/// FAILED --(caller retry, below budget)--> PENDING
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Queued,
    Pending,
    Sent,
    Failed,
}

impl DeliveryStatus {
    /// `SENT` is the only state no event may leave.
    #[must_use]
    pub const fn is_delivered(self) -> bool {
        matches!(self, Self::Sent)
    }

    /// Whether the correlator may attribute a device report to a record in this state.
    #[must_use]
    pub const fn awaits_confirmation(self) -> bool {
        matches!(self, Self::Queued | Self::Pending)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Pending => "PENDING",
            Self::Sent => "SENT",
            Self::Failed => "FAILED",
        }
    }
}

impl Display for DeliveryStatus {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        fmt.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown delivery status: {0}")]
pub struct ParseStatusError(pub String);

impl FromStr for DeliveryStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "QUEUED" => Ok(Self::Queued),
            "PENDING" => Ok(Self::Pending),
            "SENT" => Ok(Self::Sent),
            "FAILED" => Ok(Self::Failed),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn only_sent_is_delivered() {
        assert!(DeliveryStatus::Sent.is_delivered());
        assert!(!DeliveryStatus::Failed.is_delivered());
        assert!(!DeliveryStatus::Pending.is_delivered());
        assert!(!DeliveryStatus::Queued.is_delivered());
    }

    #[test]
    fn confirmation_candidates() {
        assert!(DeliveryStatus::Queued.awaits_confirmation());
        assert!(DeliveryStatus::Pending.awaits_confirmation());
        assert!(!DeliveryStatus::Sent.awaits_confirmation());
        assert!(!DeliveryStatus::Failed.awaits_confirmation());
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("sent".parse(), Ok(DeliveryStatus::Sent));
        assert_eq!(" Pending ".parse(), Ok(DeliveryStatus::Pending));
        assert_eq!(
            "delivered".parse::<DeliveryStatus>(),
            Err(ParseStatusError("delivered".to_string()))
        );
    }

    #[test]
    fn display_matches_wire_names() {
        assert_eq!(DeliveryStatus::Queued.to_string(), "QUEUED");
        assert_eq!(DeliveryStatus::Failed.to_string(), "FAILED");
    }
}
