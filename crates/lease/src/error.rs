#![forbid(unsafe_code)]

use enroll_storage::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum LeaseError {
    /// Another registration holds the slot. Never retried automatically.
    #[error("enrollment slot busy{}", remaining_suffix(.remaining_secs))]
    Busy { remaining_secs: Option<u64> },
    #[error("store subscription lost; lease status unknown")]
    SubscriptionLost,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("invalid lease config: {0}")]
    InvalidConfig(&'static str),
    #[error("lease manager stopped")]
    Stopped,
}

impl LeaseError {
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(err) => err.is_retryable(),
            Self::Busy { .. } | Self::SubscriptionLost | Self::InvalidConfig(_) | Self::Stopped => {
                false
            }
        }
    }
}

fn remaining_suffix(remaining_secs: &Option<u64>) -> String {
    match remaining_secs {
        Some(secs) => format!(" ({secs}s remaining)"),
        None => String::new(),
    }
}
