use async_trait::async_trait;
use relay_common::DeliveryStatus;
use serde::{Deserialize, Serialize};

use crate::{DeliveryRecord, IncomingMessage, NewDeliveryRecord, RecordId, Transition};

/// Filter for [`RecordStore::list`]; `None` fields match everything
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFilter {
    pub status: Option<DeliveryStatus>,
    pub owner_id: Option<String>,
    pub destination: Option<String>,
}

impl RecordFilter {
    #[must_use]
    pub fn matches(&self, record: &DeliveryRecord) -> bool {
        self.status.is_none_or(|status| record.status == status)
            && self
                .owner_id
                .as_deref()
                .is_none_or(|owner| record.owner_id == owner)
            && self
                .destination
                .as_deref()
                .is_none_or(|destination| record.destination == destination)
    }
}

const fn default_limit() -> usize {
    50
}

/// Offset/limit pagination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: default_limit(),
        }
    }
}

/// Persistence interface shared by the intake gate, the processor and the correlator.
#[async_trait]
pub trait RecordStore: Send + Sync + std::fmt::Debug {
    /// Persist a new record in state `QUEUED`
    async fn create(&self, record: NewDeliveryRecord) -> crate::Result<DeliveryRecord>;

    /// Fetch a record by ID
    async fn get(&self, id: &RecordId) -> crate::Result<DeliveryRecord>;

    /// Apply a status transition atomically.
    ///
    /// Refuses anything that would overwrite a `SENT` record. Returns the record as
    /// it is after the change.
    async fn update_status(
        &self,
        id: &RecordId,
        transition: Transition,
    ) -> crate::Result<DeliveryRecord>;

    /// The most recently created record for `destination` that is still `PENDING` or `QUEUED`
    async fn find_most_recent_pending_by_destination(
        &self,
        destination: &str,
    ) -> crate::Result<Option<DeliveryRecord>>;

    /// Records matching `filter`, newest first
    async fn list(&self, filter: &RecordFilter, page: Page) -> crate::Result<Vec<DeliveryRecord>>;

    /// Persist a device-reported incoming message
    async fn record_incoming(&self, message: IncomingMessage) -> crate::Result<()>;

    /// Incoming messages, newest first
    async fn list_incoming(&self, page: Page) -> crate::Result<Vec<IncomingMessage>>;
}
