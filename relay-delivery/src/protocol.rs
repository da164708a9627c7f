//! Pipe-delimited text protocol spoken with the device agent.
//!
//! | Topic    | Direction      | Payload                              |
//! |----------|----------------|--------------------------------------|
//! | control  | relay → device | `<destination>\|<payload>`           |
//! | status   | device → relay | `<destination>\|<status>\|<error>`   |
//! | incoming | device → relay | `<destination>\|<text>\|<timestamp>` |
//!
//! None of these carry a record identifier.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use relay_store::DeviceTimestamp;

use crate::{ProtocolError, validation::strip_formatting};

/// Device timestamps below this are read as seconds since boot.
pub const SINCE_BOOT_CEILING: u64 = 1_000_000_000;

/// Wall-clock values at or above this are read as milliseconds.
const MILLIS_FLOOR: u64 = 1_000_000_000_000;

/// Send instruction published on the control topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlCommand<'a> {
    pub destination: &'a str,
    pub payload: &'a str,
}

impl<'a> ControlCommand<'a> {
    #[must_use]
    pub const fn new(destination: &'a str, payload: &'a str) -> Self {
        Self {
            destination,
            payload,
        }
    }
}

impl fmt::Display for ControlCommand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.destination, self.payload)
    }
}

/// Status tokens a device reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    Sending,
    Sent,
    Failed,
}

impl FromStr for DeviceStatus {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SENDING" => Ok(Self::Sending),
            "SENT" => Ok(Self::Sent),
            "FAILED" => Ok(Self::Failed),
            _ => Err(ProtocolError::UnknownStatus(s.to_string())),
        }
    }
}

/// Parsed status report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub destination: String,
    pub status: DeviceStatus,
    pub error: Option<String>,
}

impl StatusReport {
    /// Parse `<destination>|<status>|<error>`.
    ///
    /// The error field is optional and may itself contain `|`.
    pub fn parse(payload: &str) -> Result<Self, ProtocolError> {
        let mut fields = payload.trim().splitn(3, '|');

        let destination = fields
            .next()
            .map(strip_formatting)
            .filter(|d| !d.is_empty())
            .ok_or_else(|| missing("destination", payload))?;

        let status = fields
            .next()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| missing("status", payload))?
            .parse()?;

        let error = fields
            .next()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(ToString::to_string);

        Ok(Self {
            destination,
            status,
            error,
        })
    }
}

/// Parsed incoming message report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingReport {
    pub destination: String,
    pub text: String,
    pub device_timestamp: DeviceTimestamp,
}

impl IncomingReport {
    /// Parse `<destination>|<text>|<timestamp>`.
    ///
    /// The text may contain `|`: the destination ends at the first separator and
    /// the timestamp starts after the last one. A report without a timestamp is
    /// kept with [`DeviceTimestamp::Unparseable`].
    pub fn parse(payload: &str) -> Result<Self, ProtocolError> {
        let payload = payload.trim_end_matches(['\r', '\n']);

        let (destination, rest) = payload
            .split_once('|')
            .ok_or_else(|| missing("text", payload))?;

        let destination = strip_formatting(destination);
        if destination.is_empty() {
            return Err(missing("destination", payload));
        }

        let (text, timestamp) = rest.rsplit_once('|').unwrap_or((rest, ""));

        Ok(Self {
            destination,
            text: text.to_string(),
            device_timestamp: normalize_device_timestamp(timestamp),
        })
    }
}

/// Classify a device-reported timestamp.
///
/// Small integers are seconds since boot. Larger integers are epoch seconds,
/// or epoch milliseconds from 10^12 upwards. RFC 3339 strings are accepted as
/// wall-clock time; anything else is kept verbatim.
#[must_use]
pub fn normalize_device_timestamp(raw: &str) -> DeviceTimestamp {
    let raw = raw.trim();

    if let Ok(value) = raw.parse::<u64>() {
        if value < SINCE_BOOT_CEILING {
            return DeviceTimestamp::SinceBoot { secs: value };
        }

        let absolute = if value < MILLIS_FLOOR {
            i64::try_from(value)
                .ok()
                .and_then(|secs| DateTime::from_timestamp(secs, 0))
        } else {
            i64::try_from(value)
                .ok()
                .and_then(DateTime::from_timestamp_millis)
        };

        return absolute.map_or_else(
            || DeviceTimestamp::Unparseable(raw.to_string()),
            DeviceTimestamp::Absolute,
        );
    }

    DateTime::parse_from_rfc3339(raw).map_or_else(
        |_| DeviceTimestamp::Unparseable(raw.to_string()),
        |instant| DeviceTimestamp::Absolute(instant.with_timezone(&Utc)),
    )
}

fn missing(field: &'static str, payload: &str) -> ProtocolError {
    ProtocolError::MissingField {
        field,
        payload: payload.to_string(),
    }
}
