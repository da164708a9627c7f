#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use relay_common::DeliveryStatus;
use relay_store::{
    DeviceTimestamp, IncomingMessage, NewDeliveryRecord, Page, RecordStore, StoreConfig,
    TestRecordStore, Transition,
};

fn new_record(destination: &str) -> NewDeliveryRecord {
    NewDeliveryRecord {
        destination: destination.to_string(),
        payload: "hello".to_string(),
        original_payload: None,
        owner_id: "owner".to_string(),
    }
}

#[tokio::test]
async fn test_wait_for_status_sees_concurrent_update() {
    let store = TestRecordStore::new();
    let record = store.create(new_record("+15550001")).await.unwrap();

    let writer = store.clone();
    let id = record.id;
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        writer.update_status(&id, Transition::Dequeued).await.unwrap();
    });

    store
        .wait_for_status(&record.id, DeliveryStatus::Pending, Duration::from_secs(1))
        .await
        .expect("status change observed");
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_status_times_out() {
    let store = TestRecordStore::new();
    let record = store.create(new_record("+15550001")).await.unwrap();

    let result = store
        .wait_for_status(&record.id, DeliveryStatus::Sent, Duration::from_secs(1))
        .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_incoming_messages_are_listed_newest_first() {
    let store = TestRecordStore::new();
    for text in ["first", "second", "third"] {
        store
            .record_incoming(IncomingMessage {
                destination: "+15550001".to_string(),
                text: text.to_string(),
                received_at: Utc::now(),
                device_timestamp: DeviceTimestamp::SinceBoot { secs: 42 },
            })
            .await
            .unwrap();
    }

    let listed = store
        .list_incoming(Page { offset: 0, limit: 2 })
        .await
        .unwrap();
    let texts: Vec<_> = listed.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, ["third", "second"]);
    assert_eq!(store.incoming().len(), 3);
}

#[tokio::test]
async fn test_store_config_builds_bounded_memory_store() {
    let config: StoreConfig = ron::from_str("Memory(capacity: Some(1))").unwrap();
    let store: Arc<dyn RecordStore> = config.build();

    store.create(new_record("+15550001")).await.unwrap();
    assert!(store.create(new_record("+15550002")).await.is_err());
}

#[tokio::test]
async fn test_store_config_bounds_incoming_messages() {
    let config: StoreConfig = ron::from_str("Memory(incoming_capacity: 2)").unwrap();
    let store: Arc<dyn RecordStore> = config.build();

    for text in ["first", "second", "third"] {
        store
            .record_incoming(IncomingMessage {
                destination: "+15550001".to_string(),
                text: text.to_string(),
                received_at: Utc::now(),
                device_timestamp: DeviceTimestamp::SinceBoot { secs: 7 },
            })
            .await
            .unwrap();
    }

    let listed = store.list_incoming(Page::default()).await.unwrap();
    let texts: Vec<_> = listed.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, ["third", "second"]);
}
