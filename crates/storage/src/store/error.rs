#![forbid(unsafe_code)]

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store {op} timed out after {timeout_ms}ms")]
    Timeout { op: &'static str, timeout_ms: u64 },
}

impl StoreError {
    /// Transport-level failures a caller may reasonably retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unavailable(_) | Self::Timeout { .. } | Self::Io(_) => true,
            Self::Sql(err) => is_busy(err),
            Self::Json(_) | Self::InvalidInput(_) => false,
        }
    }
}

pub(crate) fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(code, _)
            if matches!(
                code.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            )
    )
}
