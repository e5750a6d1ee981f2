use chrono::{DateTime, Utc};

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt storage: {0}")]
    Corrupt(String),

    #[error("cannot encode value: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("storage lock poisoned")]
    Poisoned,
}

/// Flat string key/value storage for session data.
///
/// Implementations must be safe to share between the session store, the
/// expiry monitor task and command handlers.
pub trait KeyValueStorage: Send + Sync {
    fn get(&self, key: &str) -> StorageResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;
    fn remove(&self, key: &str) -> StorageResult<()>;
}

/// Wall clock for token expiry checks; tests substitute a manual one.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
