#![forbid(unsafe_code)]

use enroll_core::{LeaseRecord, LeaseStatus, Registrant};
use serde_json::Value;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq)]
enum LeaseState {
    Free,
    Pending { record: LeaseRecord },
    /// Expired, completed, or unreadable; waiting for the clear to land.
    Expiring { registrant: Option<Registrant> },
    Unknown,
}

impl LeaseState {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pending { .. } => "pending",
            Self::Expiring { .. } => "expiring",
            Self::Unknown => "unknown",
        }
    }
}

/// Inputs to the machine. Lease state only ever changes through `Observed`;
/// this instance's own writes and deletes are seen the same way as anyone
/// else's.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Event {
    /// Store snapshot of the lease path.
    Observed(Option<Value>),
    Tick,
    ClearFinished { ok: bool },
    SubscriptionLost(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Effect {
    /// Delete the lease record.
    Clear,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ClearProgress {
    Idle,
    InFlight,
    /// The delete succeeded; waiting for the store to report the slot empty.
    Landed,
}

/// Lease state as seen by one client. Pure: time comes in with each event and
/// store access goes out as [`Effect`]s.
#[derive(Debug)]
pub(crate) struct LeaseMachine {
    state: LeaseState,
    ttl: Duration,
    clear: ClearProgress,
}

impl LeaseMachine {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            state: LeaseState::Free,
            ttl,
            clear: ClearProgress::Idle,
        }
    }

    pub(crate) fn status(&self, now_ms: i64) -> LeaseStatus {
        match &self.state {
            LeaseState::Free => LeaseStatus::Free,
            LeaseState::Pending { record } => LeaseStatus::Pending {
                registrant: record.registrant().clone(),
                remaining_secs: record.remaining_secs(now_ms, self.ttl),
            },
            LeaseState::Expiring { registrant } => LeaseStatus::Expiring {
                registrant: registrant.clone(),
            },
            LeaseState::Unknown => LeaseStatus::Unknown,
        }
    }

    pub(crate) fn handle(&mut self, event: Event, now_ms: i64) -> Option<Effect> {
        if let Event::ClearFinished { ok } = event {
            let expiring = matches!(self.state, LeaseState::Expiring { .. });
            self.clear = if ok && expiring {
                ClearProgress::Landed
            } else {
                ClearProgress::Idle
            };
            return None;
        }
        if matches!(self.state, LeaseState::Unknown) {
            return None;
        }

        match event {
            Event::Observed(value) => {
                // An empty slot settles any clear; a new record after a landed
                // clear needs its own.
                if value.is_none() || self.clear == ClearProgress::Landed {
                    self.clear = ClearProgress::Idle;
                }
                match value {
                    Some(value) => self.observe(&value, now_ms),
                    None => {
                        self.transition(LeaseState::Free);
                        None
                    }
                }
            }
            Event::Tick => self.tick(now_ms),
            Event::ClearFinished { .. } => None,
            Event::SubscriptionLost(reason) => {
                tracing::warn!(%reason, "lease subscription lost");
                self.transition(LeaseState::Unknown);
                None
            }
        }
    }

    fn observe(&mut self, value: &Value, now_ms: i64) -> Option<Effect> {
        let record = match LeaseRecord::from_value(value) {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(error = %err, "unreadable lease record, reclaiming slot");
                self.transition(LeaseState::Expiring { registrant: None });
                return self.clear();
            }
        };

        if record.registration_completed() {
            tracing::info!(name = record.registrant().name(), "registration completed on device");
            self.expire(record.registrant().clone())
        } else if record.remaining(now_ms, self.ttl).is_zero() {
            self.expire(record.registrant().clone())
        } else {
            self.transition(LeaseState::Pending { record });
            None
        }
    }

    fn tick(&mut self, now_ms: i64) -> Option<Effect> {
        match &self.state {
            LeaseState::Pending { record } if record.remaining(now_ms, self.ttl).is_zero() => {
                let registrant = record.registrant().clone();
                self.expire(registrant)
            }
            // A failed clear is retried until the slot is reclaimed.
            LeaseState::Expiring { .. } => self.clear(),
            _ => None,
        }
    }

    fn expire(&mut self, registrant: Registrant) -> Option<Effect> {
        self.transition(LeaseState::Expiring {
            registrant: Some(registrant),
        });
        self.clear()
    }

    fn clear(&mut self) -> Option<Effect> {
        if self.clear != ClearProgress::Idle {
            return None;
        }
        self.clear = ClearProgress::InFlight;
        Some(Effect::Clear)
    }

    fn transition(&mut self, next: LeaseState) {
        if self.state != next {
            tracing::debug!(from = self.state.as_str(), to = next.as_str(), "lease state");
            self.state = next;
        }
    }
}

#[cfg(test)]
mod tests;
