pub mod logging;
pub mod status;

pub use status::{DeliveryStatus, ParseStatusError};
pub use tracing;

/// Application-level retry budget for a single delivery record.
pub const MAX_RETRIES: u32 = 3;

/// Broadcast to long-running tasks when the relay stops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
}
