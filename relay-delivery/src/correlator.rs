//! Matches device reports back to delivery records.
//!
//! Status reports carry only the destination, so a report is attributed to the
//! most recently created record for that destination that is still `QUEUED` or
//! `PENDING`. With several unconfirmed sends to one destination the newest one
//! absorbs the report. Reports that match nothing are logged and dropped.

use std::sync::Arc;

use chrono::Utc;
use relay_common::{
    DeliveryStatus, Signal, incoming, internal,
    tracing::{debug, warn},
};
use relay_store::{IncomingMessage, RecordId, RecordStore, StoreError, Transition};
use relay_transport::InboundEvent;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::{
    error::RelayError,
    protocol::{DeviceStatus, IncomingReport, StatusReport},
};

/// Reason recorded when the device reports failure without saying why.
const UNSPECIFIED_DEVICE_FAILURE: &str = "device reported failure";

/// What a single inbound event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorrelationOutcome {
    /// The record moved to `status`.
    Applied {
        record_id: RecordId,
        status: DeliveryStatus,
    },
    /// The device is working on the send; nothing changes.
    InProgress { record_id: RecordId },
    /// No unconfirmed record for this destination.
    Miss { destination: String },
    /// The matched record refused the change (it settled concurrently).
    Ignored { record_id: RecordId },
    /// An inbound message was stored for audit.
    Recorded,
}

#[derive(Debug, Clone)]
pub struct Correlator {
    store: Arc<dyn RecordStore>,
}

impl Correlator {
    #[must_use]
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Consume inbound events until shutdown or until the transport goes away.
    ///
    /// Malformed payloads and store failures are logged; they never stop the loop.
    pub async fn serve(
        &self,
        mut events: broadcast::Receiver<InboundEvent>,
        mut shutdown: broadcast::Receiver<Signal>,
    ) -> Result<(), RelayError> {
        internal!(level = INFO, "Correlator starting");

        loop {
            tokio::select! {
                biased;
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown) => {
                            internal!("Correlator received shutdown signal");
                        }
                        Err(e) => debug!("Correlator shutdown channel error: {e}"),
                    }
                    break;
                }
                event = events.recv() => match event {
                    Ok(event) => {
                        if let Err(e) = self.handle(event).await {
                            warn!("Dropping inbound event: {e}");
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Correlator lagged, {skipped} inbound event(s) lost");
                    }
                    Err(RecvError::Closed) => {
                        internal!(level = WARN, "Inbound event stream closed");
                        break;
                    }
                },
            }
        }

        internal!(level = INFO, "Correlator shutdown complete");
        Ok(())
    }

    pub async fn handle(&self, event: InboundEvent) -> Result<CorrelationOutcome, RelayError> {
        match event {
            InboundEvent::Status(payload) => self.handle_status(&payload).await,
            InboundEvent::Incoming(payload) => self.handle_incoming(&payload).await,
        }
    }

    /// Apply a `<destination>|<status>|<error>` report.
    pub async fn handle_status(&self, payload: &str) -> Result<CorrelationOutcome, RelayError> {
        incoming!("STATUS {payload}");

        let report = StatusReport::parse(payload).map_err(|e| {
            warn!("Malformed status report {payload:?}: {e}");
            RelayError::Protocol(e)
        })?;

        let Some(record) = self
            .store
            .find_most_recent_pending_by_destination(&report.destination)
            .await?
        else {
            warn!(
                "No unconfirmed record for {}, dropping {:?} report",
                report.destination, report.status
            );
            return Ok(CorrelationOutcome::Miss {
                destination: report.destination,
            });
        };

        let transition = match report.status {
            DeviceStatus::Sending => {
                internal!(record = record.id, level = DEBUG, "Device is sending");
                return Ok(CorrelationOutcome::InProgress {
                    record_id: record.id,
                });
            }
            DeviceStatus::Sent => Transition::Delivered,
            DeviceStatus::Failed => Transition::Failed {
                reason: report
                    .error
                    .unwrap_or_else(|| UNSPECIFIED_DEVICE_FAILURE.to_string()),
            },
        };
        let status = transition.target();

        match self.store.update_status(&record.id, transition).await {
            Ok(_) => {
                internal!(record = record.id, level = INFO, "Record is now {status}");
                Ok(CorrelationOutcome::Applied {
                    record_id: record.id,
                    status,
                })
            }
            Err(StoreError::Transition { id, source }) => {
                warn!("{id} refused {status}: {source}");
                Ok(CorrelationOutcome::Ignored { record_id: id })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Store a `<destination>|<text>|<timestamp>` report for audit.
    pub async fn handle_incoming(&self, payload: &str) -> Result<CorrelationOutcome, RelayError> {
        incoming!("INCOMING {payload}");

        let report = IncomingReport::parse(payload).map_err(|e| {
            warn!("Malformed incoming report {payload:?}: {e}");
            RelayError::Protocol(e)
        })?;

        self.store
            .record_incoming(IncomingMessage {
                destination: report.destination,
                text: report.text,
                received_at: Utc::now(),
                device_timestamp: report.device_timestamp,
            })
            .await?;

        Ok(CorrelationOutcome::Recorded)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use relay_store::{DeviceTimestamp, MemoryRecordStore, NewDeliveryRecord};

    use super::*;

    async fn pending(store: &MemoryRecordStore, destination: &str) -> RecordId {
        let record = store
            .create(NewDeliveryRecord {
                destination: destination.to_string(),
                payload: "hi".to_string(),
                original_payload: None,
                owner_id: "owner".to_string(),
            })
            .await
            .unwrap();
        store
            .update_status(&record.id, Transition::Dequeued)
            .await
            .unwrap();
        record.id
    }

    fn correlator(store: &Arc<MemoryRecordStore>) -> Correlator {
        Correlator::new(Arc::clone(store) as Arc<dyn RecordStore>)
    }

    #[tokio::test]
    async fn test_sent_marks_record_delivered() {
        let store = Arc::new(MemoryRecordStore::new());
        let id = pending(&store, "+15550001").await;

        let outcome = correlator(&store)
            .handle_status("+15550001|SENT|")
            .await
            .unwrap();

        assert_eq!(
            outcome,
            CorrelationOutcome::Applied {
                record_id: id,
                status: DeliveryStatus::Sent
            }
        );
        let record = store.get(&id).await.unwrap();
        assert_eq!(record.status, DeliveryStatus::Sent);
        assert!(record.sent_at.is_some());
    }

    #[tokio::test]
    async fn test_failed_without_reason_gets_default() {
        let store = Arc::new(MemoryRecordStore::new());
        let id = pending(&store, "+15550001").await;

        correlator(&store)
            .handle_status("+15550001|FAILED|")
            .await
            .unwrap();

        let record = store.get(&id).await.unwrap();
        assert_eq!(record.status, DeliveryStatus::Failed);
        assert_eq!(record.error_message.as_deref(), Some(UNSPECIFIED_DEVICE_FAILURE));
    }

    #[tokio::test]
    async fn test_newest_unconfirmed_record_wins() {
        let store = Arc::new(MemoryRecordStore::new());
        let older = pending(&store, "+15550001").await;
        let newer = pending(&store, "+15550001").await;

        correlator(&store)
            .handle_status("+15550001|SENT|")
            .await
            .unwrap();

        assert_eq!(store.get(&newer).await.unwrap().status, DeliveryStatus::Sent);
        assert_eq!(store.get(&older).await.unwrap().status, DeliveryStatus::Pending);
    }

    #[tokio::test]
    async fn test_sending_changes_nothing() {
        let store = Arc::new(MemoryRecordStore::new());
        let id = pending(&store, "+15550001").await;

        let outcome = correlator(&store)
            .handle_status("+15550001|SENDING|")
            .await
            .unwrap();

        assert_eq!(outcome, CorrelationOutcome::InProgress { record_id: id });
        assert_eq!(store.get(&id).await.unwrap().status, DeliveryStatus::Pending);
    }

    #[tokio::test]
    async fn test_malformed_status_is_an_error() {
        let store = Arc::new(MemoryRecordStore::new());

        let result = correlator(&store).handle_status("garbage").await;
        assert!(matches!(result, Err(RelayError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_incoming_is_recorded() {
        let store = Arc::new(MemoryRecordStore::new());

        let outcome = correlator(&store)
            .handle_incoming("+15550002|hello|120")
            .await
            .unwrap();
        assert_eq!(outcome, CorrelationOutcome::Recorded);

        let messages = store.list_incoming(relay_store::Page::default()).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, "hello");
        assert_eq!(
            messages[0].device_timestamp,
            DeviceTimestamp::SinceBoot { secs: 120 }
        );
    }

    #[tokio::test]
    async fn test_serve_stops_on_shutdown_signal() {
        let store = Arc::new(MemoryRecordStore::new());
        let (events, events_rx) = broadcast::channel(4);
        let (shutdown, shutdown_rx) = broadcast::channel(1);

        let task = tokio::spawn(async move {
            correlator(&store).serve(events_rx, shutdown_rx).await
        });
        shutdown.send(Signal::Shutdown).unwrap();

        let result = tokio::time::timeout(std::time::Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        drop(events);
    }
}
