#![forbid(unsafe_code)]

use super::StoreError;
use enroll_core::StorePath;
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    Accepted,
    AlreadyExists,
}

/// Change notification for a subscribed path.
#[derive(Clone, Debug, PartialEq)]
pub enum StoreEvent {
    /// Current value at the path; `None` when absent.
    Snapshot(Option<Value>),
    /// The subscription ended without being cancelled. No further events follow.
    Lost(String),
}

/// Invoked for every [`StoreEvent`]. Must return promptly and must not call back
/// into the store that delivered it.
pub type ChangeCallback = Box<dyn Fn(StoreEvent) + Send + Sync + 'static>;

/// Key-addressed shared state with atomic writes and push subscriptions.
pub trait KvStore: Send + Sync {
    fn write(&self, path: &StorePath, value: &Value) -> Result<(), StoreError>;

    /// Writes only if nothing is stored at `path`.
    fn conditional_write(
        &self,
        path: &StorePath,
        value: &Value,
    ) -> Result<WriteOutcome, StoreError>;

    /// Removing an absent path is a successful no-op.
    fn delete(&self, path: &StorePath) -> Result<(), StoreError>;

    /// Delivers the current snapshot immediately, then every change until the
    /// returned handle is dropped.
    fn subscribe(
        &self,
        path: &StorePath,
        on_change: ChangeCallback,
    ) -> Result<Subscription, StoreError>;

    /// `false` when `conditional_write` cannot be trusted to be atomic.
    fn supports_conditional_write(&self) -> bool {
        true
    }
}

/// Cancels its subscription when dropped.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
