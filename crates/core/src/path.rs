#![forbid(unsafe_code)]

/// Well-known location of the single pending-registration record.
pub const LEASE_PATH: &str = "pendingUser/current";

const MAX_PATH_LEN: usize = 256;

/// Slash-separated key in the shared store.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StorePath(String);

impl StorePath {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn try_new(value: impl Into<String>) -> Result<Self, StorePathError> {
        let value = value.into();
        validate_store_path(&value)?;
        Ok(Self(value))
    }

    pub fn lease() -> Self {
        Self(LEASE_PATH.to_string())
    }
}

impl std::fmt::Display for StorePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorePathError {
    Empty,
    TooLong,
    EmptySegment,
    InvalidChar { ch: char, index: usize },
}

impl StorePathError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Empty => "store path must not be empty",
            Self::TooLong => "store path is too long",
            Self::EmptySegment => "store path must not contain empty segments",
            Self::InvalidChar { .. } => "store path contains an invalid character",
        }
    }
}

impl std::fmt::Display for StorePathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidChar { ch, index } => {
                write!(f, "{} ({ch:?} at {index})", self.message())
            }
            other => f.write_str(other.message()),
        }
    }
}

impl std::error::Error for StorePathError {}

fn validate_store_path(value: &str) -> Result<(), StorePathError> {
    if value.is_empty() {
        return Err(StorePathError::Empty);
    }
    if value.len() > MAX_PATH_LEN {
        return Err(StorePathError::TooLong);
    }
    if value.split('/').any(str::is_empty) {
        return Err(StorePathError::EmptySegment);
    }
    for (index, ch) in value.chars().enumerate() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '/' | '.' | '_' | '-') {
            continue;
        }
        return Err(StorePathError::InvalidChar { ch, index });
    }
    Ok(())
}
