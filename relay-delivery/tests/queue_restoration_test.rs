//! Records persisted as QUEUED survive a restart
#![allow(clippy::expect_used, clippy::unwrap_used)]

mod support;

use std::time::Duration;

use pretty_assertions::assert_eq;
use relay_common::DeliveryStatus;
use relay_delivery::RelayApi;
use relay_store::{RecordStore, TestRecordStore, Transition};
use support::{Harness, WAIT, config, new_record};

#[tokio::test(start_paused = true)]
async fn test_queued_records_are_restored_oldest_first() {
    let store = TestRecordStore::new();
    let first = store.create(new_record("+15550001111", "one")).await.unwrap();
    let settled = store.create(new_record("+15550002222", "two")).await.unwrap();
    let last = store.create(new_record("+15550003333", "three")).await.unwrap();
    store
        .update_status(&settled.id, Transition::Dequeued)
        .await
        .unwrap();

    let harness = Harness::with_store(config(1), store);
    harness.service.start().await.unwrap();

    harness.transport.wait_for_publishes(2, WAIT).await.unwrap();
    let payloads: Vec<_> = harness
        .transport
        .published()
        .into_iter()
        .map(|m| m.payload)
        .collect();
    assert_eq!(payloads, vec!["+15550001111|one", "+15550003333|three"]);

    for id in [first.id, last.id] {
        assert_eq!(
            harness.service.get(&id).await.unwrap().status,
            DeliveryStatus::Pending
        );
    }

    harness.service.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_restore_can_be_disabled() {
    let store = TestRecordStore::new();
    store.create(new_record("+15550001111", "one")).await.unwrap();

    let mut relay_config = config(1);
    relay_config.processor.restore_on_start = false;

    let harness = Harness::with_store(relay_config, store);
    harness.service.start().await.unwrap();

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(harness.transport.publish_count(), 0);
    assert_eq!(harness.service.queue_status().size, 0);

    harness.service.stop().await.unwrap();
}
