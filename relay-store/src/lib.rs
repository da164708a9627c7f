//! Persistence seam for delivery records and device-reported incoming messages.
//!
//! The relay treats storage as an external collaborator: everything goes through
//! [`RecordStore`]. The only rule the store itself enforces is the status guard on
//! [`RecordStore::update_status`], which is what lets the processor and the
//! correlator write to the same record without sharing a lock.

pub mod backends;
pub mod config;
pub mod error;
pub mod record;
pub mod r#trait;
pub mod types;

pub use backends::{MemoryRecordStore, TestRecordStore};
pub use config::StoreConfig;
pub use error::{Result, StoreError, TransitionError};
pub use record::{
    DeliveryRecord, DeviceTimestamp, IncomingMessage, NewDeliveryRecord, Transition,
};
pub use r#trait::{Page, RecordFilter, RecordStore};
pub use types::RecordId;
