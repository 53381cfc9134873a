use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::QueryReturnedNoRows => StorageError::NotFound(err.to_string()),
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StorageError::Conflict(err.to_string())
            }
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::DatabaseBusy
                    || e.code == rusqlite::ErrorCode::DatabaseLocked =>
            {
                StorageError::Unavailable(err.to_string())
            }
            _ => StorageError::Unavailable(err.to_string()),
        }
    }
}

impl From<StorageError> for convocore_core::CoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(m) => convocore_core::CoreError::NotFound(m),
            StorageError::Conflict(m) => convocore_core::CoreError::Conflict(m),
            StorageError::Unavailable(m) => convocore_core::CoreError::StorageUnavailable(m),
            StorageError::Serialization(e) => convocore_core::CoreError::Serialization(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
