//! Transport-level retry policy for a single publish.
//!
//! This is separate from the application-level retry budget on a record: these
//! attempts happen inside one processing cycle and never touch `retry_count`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishRetryPolicy {
    /// Publish attempts per processing cycle, including the first.
    ///
    /// Default: 3
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Fixed pause between attempts (in seconds).
    ///
    /// Default: 3
    #[serde(default = "defaults::backoff_secs")]
    pub backoff_secs: u64,
}

impl Default for PublishRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            backoff_secs: defaults::backoff_secs(),
        }
    }
}

impl PublishRetryPolicy {
    /// Whether another attempt follows `attempt` (1-based).
    #[must_use]
    pub const fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.attempts()
    }

    #[must_use]
    pub const fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }

    /// Attempts actually made; a zero configuration still publishes once.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        if self.max_attempts == 0 {
            1
        } else {
            self.max_attempts
        }
    }
}

mod defaults {
    pub const fn max_attempts() -> u32 {
        3
    }

    pub const fn backoff_secs() -> u64 {
        3
    }
}
