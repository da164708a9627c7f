//! In-memory FIFO of records waiting for the processor, plus the in-flight flag.

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use relay_store::{DeliveryRecord, RecordId};
use serde::Serialize;
use tokio::sync::Notify;

/// One unit of pending work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueEntry {
    pub record_id: RecordId,
    pub destination: String,
    pub payload: String,
    pub enqueued_at: DateTime<Utc>,
}

impl From<&DeliveryRecord> for QueueEntry {
    fn from(record: &DeliveryRecord) -> Self {
        Self {
            record_id: record.id,
            destination: record.destination.clone(),
            payload: record.payload.clone(),
            enqueued_at: Utc::now(),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: Mutex<VecDeque<QueueEntry>>,
    in_flight: AtomicBool,
    wake: Notify,
}

/// Shared handle to the delivery queue.
///
/// Cloning is cheap; every clone sees the same entries and the same flag.
#[derive(Debug, Clone, Default)]
pub struct DeliveryQueue {
    inner: Arc<Inner>,
}

impl DeliveryQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry and wake the processor. Returns the 1-based position.
    pub fn enqueue(&self, entry: QueueEntry) -> usize {
        let position = {
            let mut entries = self.inner.entries.lock();
            entries.push_back(entry);
            entries.len()
        };

        self.inner.wake.notify_one();
        position
    }

    pub(crate) fn dequeue(&self) -> Option<QueueEntry> {
        self.inner.entries.lock().pop_front()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.entries.lock().is_empty()
    }

    /// Whether a send is currently in flight.
    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// 1-based position of a record, if it is still waiting.
    #[must_use]
    pub fn position(&self, id: &RecordId) -> Option<usize> {
        self.inner
            .entries
            .lock()
            .iter()
            .position(|entry| entry.record_id == *id)
            .map(|index| index + 1)
    }

    /// Copy of the waiting entries in dispatch order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<QueueEntry> {
        self.inner.entries.lock().iter().cloned().collect()
    }

    pub(crate) async fn notified(&self) {
        self.inner.wake.notified().await;
    }

    /// Claim the in-flight flag. At most one guard exists at a time.
    pub(crate) fn begin_flight(&self) -> Option<InFlight<'_>> {
        self.inner
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight {
                flag: &self.inner.in_flight,
            })
    }
}

/// Holds the in-flight flag; dropping it releases the flag.
#[derive(Debug)]
pub(crate) struct InFlight<'a> {
    flag: &'a AtomicBool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
