//! Outbound relay and delivery confirmation
//!
//! This crate provides:
//! - An intake gate that validates requests, creates records and enqueues work
//! - A FIFO delivery queue drained by a single-flight, paced processor
//! - A correlator that matches identifier-less device reports to records
//! - [`RelayService`], which wires them to a store and a transport

mod config;
mod correlator;
mod error;
mod intake;
mod policy;
mod processor;
pub mod protocol;
pub mod queue;
mod service;
pub mod validation;

pub use config::RelayConfig;
pub use correlator::{CorrelationOutcome, Correlator};
pub use error::{ProtocolError, RelayError, ValidationError};
pub use intake::{BatchItem, IntakeConfig, IntakeGate, QueueStatus, RetryReceipt, SubmitReceipt};
pub use policy::PublishRetryPolicy;
pub use processor::{CycleOutcome, DeliveryProcessor, ProcessorConfig, RELAY_UNAVAILABLE};
pub use queue::{DeliveryQueue, QueueEntry};
pub use service::{RelayApi, RelayService};
