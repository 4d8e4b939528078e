#![forbid(unsafe_code)]

use crate::LeaseError;
use enroll_core::{DEFAULT_LEASE_TTL, StorePath};
use std::time::Duration;

const DEFAULT_TICK: Duration = Duration::from_secs(1);
const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeaseConfig {
    /// Where the lease record lives.
    pub path: StorePath,
    pub ttl: Duration,
    /// Countdown refresh interval.
    pub tick: Duration,
    /// Upper bound on any single store round-trip.
    pub store_timeout: Duration,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            path: StorePath::lease(),
            ttl: DEFAULT_LEASE_TTL,
            tick: DEFAULT_TICK,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }
}

impl LeaseConfig {
    pub fn with_path(mut self, path: StorePath) -> Self {
        self.path = path;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn with_store_timeout(mut self, store_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), LeaseError> {
        if self.ttl.is_zero() {
            return Err(LeaseError::InvalidConfig("ttl must be positive"));
        }
        if self.tick.is_zero() {
            return Err(LeaseError::InvalidConfig("tick must be positive"));
        }
        if self.store_timeout.is_zero() {
            return Err(LeaseError::InvalidConfig("store_timeout must be positive"));
        }
        Ok(())
    }
}
