#![forbid(unsafe_code)]

use enroll_core::StorePath;
use enroll_storage::{KvStore, SqliteStore, SqliteStoreOptions, StoreEvent, WriteOutcome};
use serde_json::json;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

fn temp_dir(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = base.join(format!("enroll_storage_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn fast_options() -> SqliteStoreOptions {
    SqliteStoreOptions {
        poll_interval: Duration::from_millis(10),
        ..SqliteStoreOptions::default()
    }
}

#[test]
fn conditional_write_conflicts_across_handles() {
    let dir = temp_dir("conditional_write_conflicts_across_handles");
    let first = SqliteStore::open(&dir).expect("open first");
    let second = SqliteStore::open(&dir).expect("open second");
    let path = StorePath::lease();

    assert_eq!(
        first.conditional_write(&path, &json!({"who": "first"})).unwrap(),
        WriteOutcome::Accepted
    );
    assert_eq!(
        second
            .conditional_write(&path, &json!({"who": "second"}))
            .unwrap(),
        WriteOutcome::AlreadyExists
    );
    assert_eq!(second.read(&path).unwrap(), Some(json!({"who": "first"})));

    second.delete(&path).unwrap();
    second.delete(&path).unwrap();
    assert_eq!(first.read(&path).unwrap(), None);
    assert_eq!(
        second
            .conditional_write(&path, &json!({"who": "second"}))
            .unwrap(),
        WriteOutcome::Accepted
    );
}

#[test]
fn unconditional_write_replaces_value() {
    let dir = temp_dir("unconditional_write_replaces_value");
    let store = SqliteStore::open(&dir).expect("open store");
    let path = StorePath::lease();

    store.write(&path, &json!(1)).unwrap();
    store.write(&path, &json!(2)).unwrap();
    assert_eq!(store.read(&path).unwrap(), Some(json!(2)));
}

#[test]
fn values_survive_reopen() {
    let dir = temp_dir("values_survive_reopen");
    let path = StorePath::lease();
    {
        let store = SqliteStore::open(&dir).expect("open store");
        store.write(&path, &json!({"kept": true})).unwrap();
    }
    let store = SqliteStore::open(&dir).expect("reopen store");
    assert_eq!(store.read(&path).unwrap(), Some(json!({"kept": true})));
}

#[test]
fn subscription_observes_other_handle() {
    let dir = temp_dir("subscription_observes_other_handle");
    let watcher = SqliteStore::open_with(&dir, fast_options()).expect("open watcher");
    let writer = SqliteStore::open(&dir).expect("open writer");
    let path = StorePath::lease();

    let (tx, rx) = mpsc::channel();
    let tx = std::sync::Mutex::new(tx);
    let subscription = watcher
        .subscribe(
            &path,
            Box::new(move |event: StoreEvent| {
                let _ = tx.lock().unwrap().send(event);
            }),
        )
        .unwrap();

    let wait = Duration::from_secs(5);
    assert_eq!(rx.recv_timeout(wait).unwrap(), StoreEvent::Snapshot(None));

    writer.conditional_write(&path, &json!("held")).unwrap();
    assert_eq!(
        rx.recv_timeout(wait).unwrap(),
        StoreEvent::Snapshot(Some(json!("held")))
    );

    writer.delete(&path).unwrap();
    assert_eq!(rx.recv_timeout(wait).unwrap(), StoreEvent::Snapshot(None));

    subscription.unsubscribe();
    std::thread::sleep(Duration::from_millis(50));
    writer.write(&path, &json!("after")).unwrap();
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
}

#[test]
fn broken_database_ends_subscription_with_lost() {
    let dir = temp_dir("broken_database_ends_subscription_with_lost");
    let watcher = SqliteStore::open_with(&dir, fast_options()).expect("open watcher");
    let path = StorePath::lease();

    let (tx, rx) = mpsc::channel();
    let tx = std::sync::Mutex::new(tx);
    let _subscription = watcher
        .subscribe(
            &path,
            Box::new(move |event: StoreEvent| {
                let _ = tx.lock().unwrap().send(event);
            }),
        )
        .unwrap();

    let wait = Duration::from_secs(5);
    assert_eq!(rx.recv_timeout(wait).unwrap(), StoreEvent::Snapshot(None));

    let saboteur = rusqlite::Connection::open(dir.join("enroll.db")).expect("open raw db");
    saboteur.busy_timeout(wait).unwrap();
    saboteur.execute_batch("DROP TABLE kv;").unwrap();

    match rx.recv_timeout(wait).unwrap() {
        StoreEvent::Lost(reason) => assert!(!reason.is_empty()),
        other => panic!("expected Lost, got {other:?}"),
    }
    // The poller has stopped and dropped its callback.
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
}
