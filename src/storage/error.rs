use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(rusqlite::Error),

    /// another writer kept the store locked past the busy timeout
    #[error("store is busy")]
    Busy,

    #[error("invalid store configuration: {0}")]
    InvalidConfig(String),

    #[error("filesystem error: {0}")]
    Fs(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("catalog worker has shut down")]
    WorkerGone,
}

impl StorageError {
    /// the same call may succeed later without any change from the caller
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Busy)
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, _)
                if matches!(
                    failure.code,
                    ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
                ) =>
            {
                StorageError::Busy
            }
            _ => StorageError::Database(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_and_locked_failures_are_retryable() {
        for code in [rusqlite::ffi::SQLITE_BUSY, rusqlite::ffi::SQLITE_LOCKED] {
            let err = rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(code), None);
            let err = StorageError::from(err);
            assert!(matches!(err, StorageError::Busy));
            assert!(err.is_retryable());
        }
    }

    #[test]
    fn other_failures_are_not_retryable() {
        let err = StorageError::from(rusqlite::Error::QueryReturnedNoRows);
        assert!(matches!(err, StorageError::Database(_)));
        assert!(!err.is_retryable());
        assert!(!StorageError::WorkerGone.is_retryable());
    }
}
