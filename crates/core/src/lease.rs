#![forbid(unsafe_code)]

use crate::time::ts_ms_to_rfc3339;
use crate::{Registrant, RegistrantError};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(120);

/// Time left on a lease created at `created_at_ms`, as seen at `now_ms`.
///
/// Derived from timestamps only, so every observer agrees regardless of when it
/// started watching. A `created_at_ms` in the future (clock skew) counts as zero
/// elapsed time.
pub fn remaining(now_ms: i64, created_at_ms: i64, ttl: Duration) -> Duration {
    let elapsed_ms = now_ms.saturating_sub(created_at_ms).max(0);
    ttl.saturating_sub(Duration::from_millis(elapsed_ms as u64))
}

/// Whole seconds left, rounded up: `0` only once the TTL has fully elapsed.
pub fn remaining_secs(now_ms: i64, created_at_ms: i64, ttl: Duration) -> u64 {
    let left = remaining(now_ms, created_at_ms, ttl);
    if left.subsec_nanos() > 0 {
        left.as_secs() + 1
    } else {
        left.as_secs()
    }
}

/// A registration in progress. Its presence at the lease path is the lease.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeaseRecord {
    registrant: Registrant,
    created_at_ms: i64,
    registration_completed: bool,
}

impl LeaseRecord {
    pub fn new(registrant: Registrant, created_at_ms: i64) -> Self {
        Self {
            registrant,
            created_at_ms,
            registration_completed: false,
        }
    }

    pub fn registrant(&self) -> &Registrant {
        &self.registrant
    }

    pub fn created_at_ms(&self) -> i64 {
        self.created_at_ms
    }

    pub fn registration_completed(&self) -> bool {
        self.registration_completed
    }

    pub fn completed(mut self) -> Self {
        self.registration_completed = true;
        self
    }

    pub fn expires_at_ms(&self, ttl: Duration) -> i64 {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        self.created_at_ms.saturating_add(ttl_ms)
    }

    pub fn remaining(&self, now_ms: i64, ttl: Duration) -> Duration {
        remaining(now_ms, self.created_at_ms, ttl)
    }

    pub fn remaining_secs(&self, now_ms: i64, ttl: Duration) -> u64 {
        remaining_secs(now_ms, self.created_at_ms, ttl)
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "username": self.registrant.name(),
            "email": self.registrant.email(),
            "createdAtMs": self.created_at_ms,
            "timestamp": ts_ms_to_rfc3339(self.created_at_ms),
            "registrationCompleted": self.registration_completed,
        })
    }

    pub fn from_value(value: &Value) -> Result<Self, LeaseRecordError> {
        let wire = LeaseRecordWire::deserialize(value)
            .map_err(|err| LeaseRecordError::Malformed(err.to_string()))?;
        let registrant = Registrant::try_new(wire.username, wire.email)
            .map_err(LeaseRecordError::InvalidRegistrant)?;
        Ok(Self {
            registrant,
            created_at_ms: wire.created_at_ms,
            registration_completed: wire.registration_completed,
        })
    }
}

// `timestamp` is informational for the device and is not read back.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LeaseRecordWire {
    username: String,
    email: String,
    created_at_ms: i64,
    #[serde(default)]
    registration_completed: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LeaseRecordError {
    Malformed(String),
    InvalidRegistrant(RegistrantError),
}

impl std::fmt::Display for LeaseRecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(detail) => write!(f, "malformed lease record: {detail}"),
            Self::InvalidRegistrant(err) => write!(f, "invalid lease registrant: {err}"),
        }
    }
}

impl std::error::Error for LeaseRecordError {}

/// What a client currently believes about the enrollment slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LeaseStatus {
    Free,
    Pending {
        registrant: Registrant,
        remaining_secs: u64,
    },
    /// Expired or completed; the record is being cleared. `registrant` is
    /// `None` when the stored value could not be decoded.
    Expiring { registrant: Option<Registrant> },
    /// The store subscription was lost; the slot state is not known.
    Unknown,
}

impl LeaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pending { .. } => "pending",
            Self::Expiring { .. } => "expiring",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_free(&self) -> bool {
        matches!(self, Self::Free)
    }

    pub fn remaining_secs(&self) -> Option<u64> {
        match self {
            Self::Pending { remaining_secs, .. } => Some(*remaining_secs),
            Self::Expiring { .. } => Some(0),
            Self::Free | Self::Unknown => None,
        }
    }

    pub fn registrant(&self) -> Option<&Registrant> {
        match self {
            Self::Pending { registrant, .. } => Some(registrant),
            Self::Expiring { registrant } => registrant.as_ref(),
            Self::Free | Self::Unknown => None,
        }
    }
}
