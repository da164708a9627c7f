//! Policy abstractions for the processor.
//!
//! - [`PublishRetryPolicy`]: how often and how patiently a publish is retried
//!   before the record is handed back to the caller as `FAILED`

pub mod retry;

pub use retry::PublishRetryPolicy;
