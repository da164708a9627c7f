//! Shared fixtures: a relay wired to the in-process transport and store
#![allow(dead_code)] // Not every test binary uses every helper

use std::{sync::Arc, time::Duration};

use relay_delivery::{ProcessorConfig, PublishRetryPolicy, RelayConfig, RelayService};
use relay_store::{NewDeliveryRecord, RecordStore, TestRecordStore};
use relay_transport::MockTransport;

/// Generous upper bound for paused-time waits.
pub const WAIT: Duration = Duration::from_secs(120);

pub struct Harness {
    pub service: RelayService,
    pub store: TestRecordStore,
    pub transport: MockTransport,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(config(2))
    }

    pub fn with_config(config: RelayConfig) -> Self {
        Self::with_store(config, TestRecordStore::new())
    }

    pub fn with_store(config: RelayConfig, store: TestRecordStore) -> Self {
        let transport = MockTransport::new();
        let service = RelayService::new(
            config,
            Arc::new(store.clone()) as Arc<dyn RecordStore>,
            Arc::new(transport.clone()),
        );

        Self {
            service,
            store,
            transport,
        }
    }
}

/// Short timings so paused-time tests stay readable.
pub fn config(inter_send_delay_secs: u64) -> RelayConfig {
    RelayConfig {
        processor: ProcessorConfig {
            tick_interval_secs: 1,
            inter_send_delay_secs,
            publish_retry: PublishRetryPolicy {
                max_attempts: 3,
                backoff_secs: 1,
            },
            restore_on_start: true,
        },
        ..RelayConfig::default()
    }
}

pub fn new_record(destination: &str, payload: &str) -> NewDeliveryRecord {
    NewDeliveryRecord {
        destination: destination.to_string(),
        payload: payload.to_string(),
        original_payload: None,
        owner_id: "tests".to_string(),
    }
}
