use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use chrono::Utc;
use relay_common::tracing::debug;

use crate::{
    DeliveryRecord, IncomingMessage, NewDeliveryRecord, RecordId, StoreError, Transition,
    r#trait::{Page, RecordFilter, RecordStore},
};

#[derive(Debug, Default)]
pub(crate) struct Records {
    pub(crate) by_id: HashMap<RecordId, DeliveryRecord>,
    /// Creation order; "most recent" means latest in this list, not latest ULID
    pub(crate) order: Vec<RecordId>,
    pub(crate) incoming: VecDeque<IncomingMessage>,
}

/// Default bound on retained incoming messages
pub const DEFAULT_INCOMING_CAPACITY: usize = 10_000;

/// In-memory record store
///
/// Records live in a `HashMap` behind an `RwLock`, with a separate creation-order
/// index so "most recently created" lookups do not depend on clock resolution.
///
/// # Capacity Management
/// An optional capacity bounds the number of delivery records. Once reached,
/// [`RecordStore::create`] fails instead of growing without limit.
///
/// Incoming messages are always bounded. They originate on the device and
/// cannot be refused, so once the bound is reached the oldest message is
/// evicted to make room.
///
/// # Concurrency
/// Every transition runs under the write lock, so the check-and-set in
/// [`DeliveryRecord::apply`] is atomic with respect to other writers.
#[derive(Debug, Clone)]
pub struct MemoryRecordStore {
    pub(crate) records: Arc<RwLock<Records>>,
    capacity: Option<usize>,
    incoming_capacity: usize,
}

impl MemoryRecordStore {
    /// Create an empty store with unlimited capacity
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(Records::default())),
            capacity: None,
            incoming_capacity: DEFAULT_INCOMING_CAPACITY,
        }
    }

    /// Create an empty store holding at most `capacity` delivery records
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Arc::new(RwLock::new(Records::default())),
            capacity: Some(capacity),
            incoming_capacity: DEFAULT_INCOMING_CAPACITY,
        }
    }

    /// Retain at most `capacity` incoming messages (minimum one)
    #[must_use]
    pub fn with_incoming_capacity(mut self, capacity: usize) -> Self {
        self.incoming_capacity = capacity.max(1);
        self
    }

    /// Number of delivery records
    ///
    /// Recovers gracefully if the lock is poisoned by accessing the underlying data.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .order
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub const fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    #[must_use]
    pub const fn incoming_capacity(&self) -> usize {
        self.incoming_capacity
    }
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn create(&self, record: NewDeliveryRecord) -> crate::Result<DeliveryRecord> {
        let mut records = self.records.write()?;

        if let Some(cap) = self.capacity
            && records.order.len() >= cap
        {
            return Err(StoreError::Internal(format!(
                "Record store capacity exceeded: {}/{cap} records",
                records.order.len()
            )));
        }

        let id = RecordId::generate();
        let record = DeliveryRecord::queued(id, record, Utc::now());

        records.by_id.insert(id, record.clone());
        records.order.push(id);

        Ok(record)
    }

    async fn get(&self, id: &RecordId) -> crate::Result<DeliveryRecord> {
        self.records
            .read()?
            .by_id
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound(*id))
    }

    async fn update_status(
        &self,
        id: &RecordId,
        transition: Transition,
    ) -> crate::Result<DeliveryRecord> {
        let mut records = self.records.write()?;
        let record = records.by_id.get_mut(id).ok_or(StoreError::NotFound(*id))?;
        let from = record.status;

        record
            .apply(transition, Utc::now())
            .map_err(|source| StoreError::Transition { id: *id, source })?;

        debug!(record_id = %id, from = %from, to = %record.status, "Record status updated");

        Ok(record.clone())
    }

    async fn find_most_recent_pending_by_destination(
        &self,
        destination: &str,
    ) -> crate::Result<Option<DeliveryRecord>> {
        let records = self.records.read()?;

        Ok(records
            .order
            .iter()
            .rev()
            .filter_map(|id| records.by_id.get(id))
            .find(|record| {
                record.destination == destination && record.status.awaits_confirmation()
            })
            .cloned())
    }

    async fn list(&self, filter: &RecordFilter, page: Page) -> crate::Result<Vec<DeliveryRecord>> {
        let records = self.records.read()?;

        Ok(records
            .order
            .iter()
            .rev()
            .filter_map(|id| records.by_id.get(id))
            .filter(|record| filter.matches(record))
            .skip(page.offset)
            .take(page.limit)
            .cloned()
            .collect())
    }

    async fn record_incoming(&self, message: IncomingMessage) -> crate::Result<()> {
        let mut records = self.records.write()?;

        while records.incoming.len() >= self.incoming_capacity {
            if let Some(evicted) = records.incoming.pop_front() {
                debug!(
                    destination = %evicted.destination,
                    capacity = self.incoming_capacity,
                    "Evicting oldest incoming message"
                );
            }
        }

        records.incoming.push_back(message);
        Ok(())
    }

    async fn list_incoming(&self, page: Page) -> crate::Result<Vec<IncomingMessage>> {
        Ok(self
            .records
            .read()?
            .incoming
            .iter()
            .rev()
            .skip(page.offset)
            .take(page.limit)
            .cloned()
            .collect())
    }
}
