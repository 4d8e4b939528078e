#![forbid(unsafe_code)]

use enroll_core::StorePath;
use enroll_storage::{
    ChangeCallback, KvStore, MemoryStore, StoreError, StoreEvent, WriteOutcome,
};
use serde_json::json;
use std::sync::{Arc, Mutex};

fn recorder() -> (Arc<Mutex<Vec<StoreEvent>>>, ChangeCallback) {
    let events: Arc<Mutex<Vec<StoreEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let callback: ChangeCallback =
        Box::new(move |event: StoreEvent| sink.lock().unwrap().push(event));
    (events, callback)
}

#[test]
fn conditional_write_refuses_occupied_path() {
    let store = MemoryStore::new();
    let path = StorePath::lease();

    assert_eq!(
        store.conditional_write(&path, &json!({"n": 1})).unwrap(),
        WriteOutcome::Accepted
    );
    assert_eq!(
        store.conditional_write(&path, &json!({"n": 2})).unwrap(),
        WriteOutcome::AlreadyExists
    );
    assert_eq!(store.get(&path), Some(json!({"n": 1})));
    assert_eq!(store.write_count(), 1);
}

#[test]
fn last_write_wins_store_overwrites() {
    let store = MemoryStore::without_conditional_write();
    let path = StorePath::lease();
    assert!(!store.supports_conditional_write());

    store.conditional_write(&path, &json!(1)).unwrap();
    assert_eq!(
        store.conditional_write(&path, &json!(2)).unwrap(),
        WriteOutcome::Accepted
    );
    assert_eq!(store.get(&path), Some(json!(2)));
}

#[test]
fn delete_is_idempotent() {
    let store = MemoryStore::new();
    let path = StorePath::lease();
    store.delete(&path).unwrap();
    store.write(&path, &json!(true)).unwrap();
    store.delete(&path).unwrap();
    store.delete(&path).unwrap();
    assert_eq!(store.get(&path), None);
}

#[test]
fn subscribe_delivers_snapshot_then_changes() {
    let store = MemoryStore::new();
    let path = StorePath::lease();
    let other = StorePath::try_new("pendingUser/other").unwrap();
    store.write(&path, &json!("a")).unwrap();

    let (events, callback) = recorder();
    let subscription = store.subscribe(&path, callback).unwrap();
    store.write(&other, &json!("ignored")).unwrap();
    store.delete(&path).unwrap();
    store.conditional_write(&path, &json!("b")).unwrap();

    assert_eq!(
        *events.lock().unwrap(),
        vec![
            StoreEvent::Snapshot(Some(json!("a"))),
            StoreEvent::Snapshot(None),
            StoreEvent::Snapshot(Some(json!("b"))),
        ]
    );

    drop(subscription);
    assert_eq!(store.subscriber_count(), 0);
    store.delete(&path).unwrap();
    assert_eq!(events.lock().unwrap().len(), 3);
}

#[test]
fn unavailable_store_fails_mutations() {
    let store = MemoryStore::new();
    let path = StorePath::lease();
    store.set_available(false);

    let err = store.write(&path, &json!(1)).unwrap_err();
    assert!(matches!(err, StoreError::Unavailable(_)));
    assert!(err.is_retryable());
    assert!(store.delete(&path).is_err());

    store.set_available(true);
    store.write(&path, &json!(1)).unwrap();
}

#[test]
fn dropped_subscribers_receive_lost() {
    let store = MemoryStore::new();
    let (events, callback) = recorder();
    let _subscription = store.subscribe(&StorePath::lease(), callback).unwrap();

    store.drop_subscribers("connection reset");
    assert_eq!(
        events.lock().unwrap().last(),
        Some(&StoreEvent::Lost("connection reset".to_string()))
    );
    assert_eq!(store.subscriber_count(), 0);
}
