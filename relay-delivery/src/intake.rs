//! Intake gate: the only way work enters the relay.
//!
//! Validation happens before anything is persisted, so a rejected request
//! leaves no trace. An accepted request always produces exactly one `QUEUED`
//! record and one queue entry.

use std::sync::Arc;

use relay_common::{DeliveryStatus, MAX_RETRIES, tracing::info};
use relay_store::{DeliveryRecord, NewDeliveryRecord, RecordId, RecordStore, Transition};
use serde::{Deserialize, Serialize};

use crate::{
    error::RelayError,
    queue::{DeliveryQueue, QueueEntry},
    validation::{normalize_destination, truncate_payload},
};

const fn default_max_payload_chars() -> usize {
    140
}

const fn default_max_batch_size() -> usize {
    1000
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakeConfig {
    /// Longer payloads are cut to this many characters
    ///
    /// Default: 140
    #[serde(default = "default_max_payload_chars")]
    pub max_payload_chars: usize,

    /// Largest accepted batch; larger batches are refused whole
    ///
    /// Default: 1000
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            max_payload_chars: default_max_payload_chars(),
            max_batch_size: default_max_batch_size(),
        }
    }
}

/// Returned for an accepted send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitReceipt {
    pub id: RecordId,
    pub status: DeliveryStatus,
    /// 1-based position in the queue at acceptance
    pub queue_position: usize,
    /// Rough wait, derived from the position and the inter-send delay
    pub eta_seconds: u64,
}

/// Per-destination result of a batch submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum BatchItem {
    Accepted {
        destination: String,
        receipt: SubmitReceipt,
    },
    Rejected {
        destination: String,
        reason: String,
    },
}

impl BatchItem {
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// Returned for an accepted retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetryReceipt {
    pub id: RecordId,
    pub status: DeliveryStatus,
    pub retry_count: u32,
    pub queue_position: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub size: usize,
    pub is_processing: bool,
    pub eta_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct IntakeGate {
    config: IntakeConfig,
    store: Arc<dyn RecordStore>,
    queue: DeliveryQueue,
    inter_send_delay_secs: u64,
}

impl IntakeGate {
    #[must_use]
    pub fn new(
        config: IntakeConfig,
        store: Arc<dyn RecordStore>,
        queue: DeliveryQueue,
        inter_send_delay_secs: u64,
    ) -> Self {
        Self {
            config,
            store,
            queue,
            inter_send_delay_secs,
        }
    }

    /// Validate, persist as `QUEUED` and enqueue a single send.
    pub async fn submit(
        &self,
        destination: &str,
        payload: &str,
        owner_id: &str,
    ) -> Result<SubmitReceipt, RelayError> {
        let destination = normalize_destination(destination)?;
        let truncated = truncate_payload(payload, self.config.max_payload_chars)?;
        if truncated.original.is_some() {
            info!(
                "Truncated payload for {destination} to {} characters",
                self.config.max_payload_chars
            );
        }

        let record = self
            .store
            .create(NewDeliveryRecord {
                destination,
                payload: truncated.payload,
                original_payload: truncated.original,
                owner_id: owner_id.to_string(),
            })
            .await?;

        let queue_position = self.queue.enqueue(QueueEntry::from(&record));
        info!(
            "Accepted {} for {} at queue position {queue_position}",
            record.id, record.destination
        );

        Ok(SubmitReceipt {
            id: record.id,
            status: record.status,
            queue_position,
            eta_seconds: self.eta(queue_position),
        })
    }

    /// Submit one payload to many destinations.
    ///
    /// An oversized batch is refused before anything is persisted. Otherwise
    /// each destination succeeds or fails on its own.
    pub async fn submit_batch<S: AsRef<str> + Sync>(
        &self,
        destinations: &[S],
        payload: &str,
        owner_id: &str,
    ) -> Result<Vec<BatchItem>, RelayError> {
        if destinations.len() > self.config.max_batch_size {
            return Err(RelayError::BatchTooLarge {
                size: destinations.len(),
                max: self.config.max_batch_size,
            });
        }

        let mut results = Vec::with_capacity(destinations.len());
        for destination in destinations {
            let destination = destination.as_ref().to_string();

            let item = match self.submit(&destination, payload, owner_id).await {
                Ok(receipt) => BatchItem::Accepted {
                    destination,
                    receipt,
                },
                Err(e) => BatchItem::Rejected {
                    destination,
                    reason: e.to_string(),
                },
            };
            results.push(item);
        }

        Ok(results)
    }

    /// Move a `FAILED` record back to `PENDING` and re-enqueue it.
    pub async fn retry(&self, id: &RecordId) -> Result<RetryReceipt, RelayError> {
        let record: DeliveryRecord = self
            .store
            .update_status(
                id,
                Transition::Retry {
                    max_retries: MAX_RETRIES,
                },
            )
            .await?;

        let queue_position = self.queue.enqueue(QueueEntry::from(&record));
        info!(
            "Retrying {} (attempt {}/{MAX_RETRIES}) at queue position {queue_position}",
            record.id, record.retry_count
        );

        Ok(RetryReceipt {
            id: record.id,
            status: record.status,
            retry_count: record.retry_count,
            queue_position,
        })
    }

    #[must_use]
    pub fn queue_status(&self) -> QueueStatus {
        let size = self.queue.len();

        QueueStatus {
            size,
            is_processing: self.queue.is_processing(),
            eta_seconds: self.eta(size),
        }
    }

    fn eta(&self, position: usize) -> u64 {
        u64::try_from(position)
            .unwrap_or(u64::MAX)
            .saturating_mul(self.inter_send_delay_secs)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use relay_store::MemoryRecordStore;

    use super::*;
    use crate::ValidationError;

    fn gate(config: IntakeConfig) -> (IntakeGate, Arc<MemoryRecordStore>, DeliveryQueue) {
        let store = Arc::new(MemoryRecordStore::new());
        let queue = DeliveryQueue::new();
        let gate = IntakeGate::new(
            config,
            Arc::clone(&store) as Arc<dyn RecordStore>,
            queue.clone(),
            45,
        );
        (gate, store, queue)
    }

    #[tokio::test]
    async fn test_submit_persists_and_enqueues() {
        let (gate, store, queue) = gate(IntakeConfig::default());

        let first = gate.submit("+1 555 000 1111", "hello", "alice").await.unwrap();
        let second = gate.submit("+15550002222", "again", "alice").await.unwrap();

        assert_eq!(first.status, DeliveryStatus::Queued);
        assert_eq!(first.queue_position, 1);
        assert_eq!(first.eta_seconds, 45);
        assert_eq!(second.queue_position, 2);
        assert_eq!(second.eta_seconds, 90);

        let record = store.get(&first.id).await.unwrap();
        assert_eq!(record.destination, "+15550001111");
        assert_eq!(record.owner_id, "alice");
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn test_long_payload_is_truncated_with_original_kept() {
        let (gate, store, _) = gate(IntakeConfig::default());
        let text = "a".repeat(200);

        let receipt = gate.submit("+15550001111", &text, "alice").await.unwrap();

        let record = store.get(&receipt.id).await.unwrap();
        assert_eq!(record.payload.chars().count(), 140);
        assert_eq!(record.original_payload, Some(text));
    }

    #[tokio::test]
    async fn test_invalid_request_leaves_no_trace() {
        let (gate, store, queue) = gate(IntakeConfig::default());

        let err = gate.submit("not a number", "hello", "alice").await.unwrap_err();
        assert!(matches!(
            err,
            RelayError::Validation(ValidationError::InvalidDestination(_))
        ));

        let err = gate.submit("+15550001111", "", "alice").await.unwrap_err();
        assert!(matches!(err, RelayError::Validation(ValidationError::EmptyPayload)));

        assert!(store.is_empty());
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_batch_reports_each_destination() {
        let (gate, store, _) = gate(IntakeConfig::default());

        let items = gate
            .submit_batch(&["+15550001111", "bogus", "+15550002222"], "hi", "alice")
            .await
            .unwrap();

        assert_eq!(items.len(), 3);
        assert!(items[0].is_accepted());
        assert!(matches!(
            &items[1],
            BatchItem::Rejected { destination, .. } if destination == "bogus"
        ));
        assert!(items[2].is_accepted());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_oversized_batch_is_refused_whole() {
        let (gate, store, _) = gate(IntakeConfig {
            max_batch_size: 2,
            ..IntakeConfig::default()
        });

        let err = gate
            .submit_batch(&["+15550001111", "+15550002222", "+15550003333"], "hi", "alice")
            .await
            .unwrap_err();

        assert!(matches!(err, RelayError::BatchTooLarge { size: 3, max: 2 }));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_retry_requires_failed_record() {
        let (gate, store, queue) = gate(IntakeConfig::default());
        let receipt = gate.submit("+15550001111", "hi", "alice").await.unwrap();

        let err = gate.retry(&receipt.id).await.unwrap_err();
        assert!(matches!(
            err,
            RelayError::NotRetryable {
                status: DeliveryStatus::Queued,
                ..
            }
        ));

        store
            .update_status(&receipt.id, Transition::Dequeued)
            .await
            .unwrap();
        store
            .update_status(
                &receipt.id,
                Transition::Failed {
                    reason: "no signal".to_string(),
                },
            )
            .await
            .unwrap();

        let retried = gate.retry(&receipt.id).await.unwrap();
        assert_eq!(retried.status, DeliveryStatus::Pending);
        assert_eq!(retried.retry_count, 1);
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn test_retry_unknown_record() {
        let (gate, _, _) = gate(IntakeConfig::default());
        let id = RecordId::generate();

        let err = gate.retry(&id).await.unwrap_err();
        assert!(matches!(err, RelayError::NotFound(missing) if missing == id));
    }

    #[test]
    fn test_queue_status() {
        let (gate, _, queue) = gate(IntakeConfig::default());
        assert_eq!(
            gate.queue_status(),
            QueueStatus {
                size: 0,
                is_processing: false,
                eta_seconds: 0
            }
        );

        queue.enqueue(QueueEntry {
            record_id: RecordId::generate(),
            destination: "+15550001111".to_string(),
            payload: "hi".to_string(),
            enqueued_at: chrono::Utc::now(),
        });
        assert_eq!(gate.queue_status().eta_seconds, 45);
    }
}
