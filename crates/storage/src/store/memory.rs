#![forbid(unsafe_code)]

use super::{ChangeCallback, KvStore, StoreError, StoreEvent, Subscription, WriteOutcome};
use enroll_core::StorePath;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// In-process store shared by cloning. Every clone sees the same values and
/// subscribers, which makes it a stand-in for a remote store in tests.
///
/// Notifications are delivered while the store lock is held, so subscribers
/// observe mutations in commit order.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Default)]
struct MemoryInner {
    values: BTreeMap<String, Value>,
    watchers: BTreeMap<u64, Watcher>,
    next_watcher_id: u64,
    unavailable: bool,
    last_write_wins: bool,
    write_count: usize,
}

struct Watcher {
    path: String,
    on_change: ChangeCallback,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that only offers last-write-wins semantics.
    pub fn without_conditional_write() -> Self {
        let store = Self::default();
        if let Ok(mut inner) = store.inner.lock() {
            inner.last_write_wins = true;
        }
        store
    }

    /// While unavailable, writes and deletes fail with [`StoreError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.unavailable = !available;
        }
    }

    /// Ends every subscription with [`StoreEvent::Lost`].
    pub fn drop_subscribers(&self, reason: &str) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        let watchers = std::mem::take(&mut inner.watchers);
        for watcher in watchers.values() {
            (watcher.on_change)(StoreEvent::Lost(reason.to_string()));
        }
    }

    /// Number of successful writes (conditional or not) so far.
    pub fn write_count(&self) -> usize {
        self.inner.lock().map(|inner| inner.write_count).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .lock()
            .map(|inner| inner.watchers.len())
            .unwrap_or(0)
    }

    pub fn get(&self, path: &StorePath) -> Option<Value> {
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.values.get(path.as_str()).cloned())
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryInner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }

    fn lock_available(&self) -> Result<MutexGuard<'_, MemoryInner>, StoreError> {
        let inner = self.lock()?;
        if inner.unavailable {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        Ok(inner)
    }
}

impl MemoryInner {
    fn notify(&self, path: &str) {
        let snapshot = self.values.get(path).cloned();
        for watcher in self.watchers.values().filter(|w| w.path == path) {
            (watcher.on_change)(StoreEvent::Snapshot(snapshot.clone()));
        }
    }
}

impl KvStore for MemoryStore {
    fn write(&self, path: &StorePath, value: &Value) -> Result<(), StoreError> {
        let mut inner = self.lock_available()?;
        inner
            .values
            .insert(path.as_str().to_string(), value.clone());
        inner.write_count += 1;
        inner.notify(path.as_str());
        Ok(())
    }

    fn conditional_write(
        &self,
        path: &StorePath,
        value: &Value,
    ) -> Result<WriteOutcome, StoreError> {
        let mut inner = self.lock_available()?;
        if !inner.last_write_wins && inner.values.contains_key(path.as_str()) {
            return Ok(WriteOutcome::AlreadyExists);
        }
        inner
            .values
            .insert(path.as_str().to_string(), value.clone());
        inner.write_count += 1;
        inner.notify(path.as_str());
        Ok(WriteOutcome::Accepted)
    }

    fn delete(&self, path: &StorePath) -> Result<(), StoreError> {
        let mut inner = self.lock_available()?;
        if inner.values.remove(path.as_str()).is_some() {
            inner.notify(path.as_str());
        }
        Ok(())
    }

    fn subscribe(
        &self,
        path: &StorePath,
        on_change: ChangeCallback,
    ) -> Result<Subscription, StoreError> {
        let mut inner = self.lock()?;
        on_change(StoreEvent::Snapshot(
            inner.values.get(path.as_str()).cloned(),
        ));

        let id = inner.next_watcher_id;
        inner.next_watcher_id += 1;
        inner.watchers.insert(
            id,
            Watcher {
                path: path.as_str().to_string(),
                on_change,
            },
        );

        let weak = Arc::downgrade(&self.inner);
        Ok(Subscription::new(move || {
            if let Some(inner) = weak.upgrade()
                && let Ok(mut inner) = inner.lock()
            {
                inner.watchers.remove(&id);
            }
        }))
    }

    fn supports_conditional_write(&self) -> bool {
        !self.lock().map(|inner| inner.last_write_wins).unwrap_or(false)
    }
}
