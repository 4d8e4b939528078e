#![forbid(unsafe_code)]

use crate::machine::{Effect, Event, LeaseMachine};
use crate::{Clock, LeaseConfig, LeaseError, SystemClock};
use enroll_core::{LeaseRecord, LeaseStatus, Registrant, StorePath};
use enroll_storage::{KvStore, StoreError, StoreEvent, Subscription, WriteOutcome};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// A successful acquisition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Accepted {
    pub record: LeaseRecord,
    pub expires_at_ms: i64,
}

struct Shared {
    store: Arc<dyn KvStore>,
    config: LeaseConfig,
    clock: Arc<dyn Clock>,
}

/// One client's view of the enrollment slot.
///
/// The manager subscribes to the lease path, keeps a local countdown for the
/// record it observes, and clears the record once the countdown reaches zero.
/// Exclusion between clients comes from the store's conditional write; the
/// manager only interprets what the store reports.
///
/// Must be started inside a tokio runtime. Dropping the manager unsubscribes
/// and stops its background task.
pub struct LeaseManager {
    shared: Arc<Shared>,
    status: watch::Receiver<LeaseStatus>,
    driver: JoinHandle<()>,
    _subscription: std::sync::Mutex<Subscription>,
}

impl LeaseManager {
    pub async fn start(store: Arc<dyn KvStore>, config: LeaseConfig) -> Result<Self, LeaseError> {
        Self::start_with_clock(store, config, Arc::new(SystemClock)).await
    }

    pub async fn start_with_clock(
        store: Arc<dyn KvStore>,
        config: LeaseConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LeaseError> {
        config.validate()?;
        if !store.supports_conditional_write() {
            tracing::warn!(
                path = %config.path,
                "store has no conditional write; single-slot exclusion is best-effort"
            );
        }

        let shared = Arc::new(Shared {
            store,
            config,
            clock,
        });
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        let forward = events_tx.clone();
        let subscription = store_call(&shared, "subscribe", move |store, path| {
            store.subscribe(
                path,
                Box::new(move |event: StoreEvent| {
                    let event = match event {
                        StoreEvent::Snapshot(value) => Event::Observed(value),
                        StoreEvent::Lost(reason) => Event::SubscriptionLost(reason),
                    };
                    send_event(&forward, event);
                }),
            )
        })
        .await?;

        // The initial snapshot is delivered during `subscribe`, so it is already
        // queued. Applying it here means `status()` is accurate on return.
        let mut machine = LeaseMachine::new(shared.config.ttl);
        let first = events_rx.recv().await.ok_or(LeaseError::Stopped)?;
        let effect = machine.handle(first, shared.clock.now_ms());
        let (status_tx, status_rx) = watch::channel(machine.status(shared.clock.now_ms()));
        if let Some(effect) = effect {
            apply_effect(&shared, effect, &events_tx);
        }

        tracing::debug!(
            path = %shared.config.path,
            status = status_rx.borrow().as_str(),
            "lease manager started"
        );

        let driver = tokio::spawn(drive(
            Arc::clone(&shared),
            machine,
            events_rx,
            events_tx,
            status_tx,
        ));

        Ok(Self {
            shared,
            status: status_rx,
            driver,
            _subscription: std::sync::Mutex::new(subscription),
        })
    }

    pub fn path(&self) -> &StorePath {
        &self.shared.config.path
    }

    pub fn config(&self) -> &LeaseConfig {
        &self.shared.config
    }

    /// Local view of the slot. Never touches the store.
    pub fn status(&self) -> LeaseStatus {
        self.status.borrow().clone()
    }

    /// Receives every status change, including countdown updates.
    pub fn watch(&self) -> watch::Receiver<LeaseStatus> {
        self.status.clone()
    }

    /// Claims the slot for `registrant` with a single conditional write.
    ///
    /// Refused without touching the store when the local view already shows a
    /// lease. The store has the final word: a concurrent winner surfaces as
    /// [`LeaseError::Busy`] as well. [`status`](Self::status) follows once the
    /// subscription reports the write.
    pub async fn acquire(&self, registrant: Registrant) -> Result<Accepted, LeaseError> {
        match self.status() {
            LeaseStatus::Free => {}
            LeaseStatus::Unknown => return Err(LeaseError::SubscriptionLost),
            held => {
                return Err(LeaseError::Busy {
                    remaining_secs: held.remaining_secs(),
                });
            }
        }

        let record = LeaseRecord::new(registrant, self.shared.clock.now_ms());
        let value = record.to_value();
        let conditional = self.shared.store.supports_conditional_write();
        if !conditional {
            tracing::warn!(path = %self.path(), "acquiring with unconditional write");
        }

        let outcome = store_call(&self.shared, "acquire", move |store, path| {
            if conditional {
                store.conditional_write(path, &value)
            } else {
                store.write(path, &value).map(|()| WriteOutcome::Accepted)
            }
        })
        .await?;

        match outcome {
            WriteOutcome::Accepted => {
                let expires_at_ms = record.expires_at_ms(self.shared.config.ttl);
                tracing::info!(
                    path = %self.path(),
                    name = record.registrant().name(),
                    expires_at_ms,
                    "lease acquired"
                );
                Ok(Accepted {
                    record,
                    expires_at_ms,
                })
            }
            WriteOutcome::AlreadyExists => {
                tracing::info!(path = %self.path(), "lease already held");
                Err(LeaseError::Busy {
                    remaining_secs: self.status().remaining_secs(),
                })
            }
        }
    }

    /// Deletes the lease record. Releasing a free slot is a no-op.
    pub async fn release(&self) -> Result<(), LeaseError> {
        store_call(&self.shared, "release", |store, path| store.delete(path)).await?;
        tracing::info!(path = %self.path(), "lease released");
        Ok(())
    }

    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for LeaseManager {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

impl std::fmt::Debug for LeaseManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseManager")
            .field("path", &self.shared.config.path)
            .field("status", &*self.status.borrow())
            .finish()
    }
}

async fn drive(
    shared: Arc<Shared>,
    mut machine: LeaseMachine,
    mut events_rx: mpsc::UnboundedReceiver<Event>,
    events_tx: mpsc::UnboundedSender<Event>,
    status_tx: watch::Sender<LeaseStatus>,
) {
    let mut ticker = tokio::time::interval(shared.config.tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        let event = tokio::select! {
            received = events_rx.recv() => match received {
                Some(event) => event,
                None => break,
            },
            _ = ticker.tick() => Event::Tick,
        };

        let now_ms = shared.clock.now_ms();
        if let Some(effect) = machine.handle(event, now_ms) {
            apply_effect(&shared, effect, &events_tx);
        }

        let next = machine.status(now_ms);
        status_tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }
}

fn apply_effect(shared: &Arc<Shared>, effect: Effect, events_tx: &mpsc::UnboundedSender<Event>) {
    match effect {
        Effect::Clear => {
            let shared = Arc::clone(shared);
            let events_tx = events_tx.clone();
            tokio::spawn(async move {
                let result = store_call(&shared, "clear", |store, path| store.delete(path)).await;
                match &result {
                    Ok(()) => tracing::info!(path = %shared.config.path, "expired lease cleared"),
                    Err(err) => {
                        tracing::warn!(path = %shared.config.path, error = %err, "lease clear failed")
                    }
                }
                send_event(&events_tx, Event::ClearFinished { ok: result.is_ok() });
            });
        }
    }
}

fn send_event(events: &mpsc::UnboundedSender<Event>, event: Event) {
    if events.send(event).is_err() {
        tracing::debug!("lease manager stopped, event dropped");
    }
}

/// Runs a blocking store call off the async workers, bounded by the configured
/// store timeout. A timed-out call may still complete in the background; its
/// effect then shows up through the subscription.
async fn store_call<T, F>(shared: &Shared, op: &'static str, call: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce(&dyn KvStore, &StorePath) -> Result<T, StoreError> + Send + 'static,
{
    let store = Arc::clone(&shared.store);
    let path = shared.config.path.clone();
    let timeout = shared.config.store_timeout;
    let task = tokio::task::spawn_blocking(move || call(store.as_ref(), &path));

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(err)) => Err(StoreError::Unavailable(format!("store {op} task failed: {err}"))),
        Err(_) => Err(StoreError::Timeout {
            op,
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}
