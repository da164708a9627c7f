//! Rebuild the in-memory queue from records persisted as `QUEUED`

use relay_common::{DeliveryStatus, tracing::info};
use relay_store::{Page, RecordFilter, RecordStore};

use crate::{
    error::RelayError,
    queue::{DeliveryQueue, QueueEntry},
};

const PAGE_SIZE: usize = 100;

/// Enqueue every `QUEUED` record not already waiting, oldest first.
pub(crate) async fn restore_queued(
    store: &dyn RecordStore,
    queue: &DeliveryQueue,
) -> Result<usize, RelayError> {
    let filter = RecordFilter {
        status: Some(DeliveryStatus::Queued),
        ..RecordFilter::default()
    };

    let mut waiting = Vec::new();
    let mut page = Page {
        offset: 0,
        limit: PAGE_SIZE,
    };

    loop {
        let batch = store.list(&filter, page).await?;
        let done = batch.len() < page.limit;
        waiting.extend(batch);

        if done {
            break;
        }
        page.offset += page.limit;
    }

    let mut restored = 0;
    for record in waiting.iter().rev() {
        if queue.position(&record.id).is_some() {
            continue;
        }

        queue.enqueue(QueueEntry::from(record));
        restored += 1;
    }

    if restored > 0 {
        info!("Restored {restored} queued record(s)");
    }

    Ok(restored)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use relay_store::{MemoryRecordStore, NewDeliveryRecord, Transition};

    use super::*;

    fn new_record(destination: &str) -> NewDeliveryRecord {
        NewDeliveryRecord {
            destination: destination.to_string(),
            payload: "hi".to_string(),
            original_payload: None,
            owner_id: "owner".to_string(),
        }
    }

    #[tokio::test]
    async fn test_restores_oldest_first_and_skips_settled() {
        let store = MemoryRecordStore::new();
        let queue = DeliveryQueue::new();

        let first = store.create(new_record("+15550001")).await.unwrap();
        let dispatched = store.create(new_record("+15550002")).await.unwrap();
        let last = store.create(new_record("+15550003")).await.unwrap();
        store
            .update_status(&dispatched.id, Transition::Dequeued)
            .await
            .unwrap();

        assert_eq!(restore_queued(&store, &queue).await.unwrap(), 2);

        let ids: Vec<_> = queue.snapshot().iter().map(|e| e.record_id).collect();
        assert_eq!(ids, vec![first.id, last.id]);

        assert_eq!(restore_queued(&store, &queue).await.unwrap(), 0);
        assert_eq!(queue.len(), 2);
    }
}
