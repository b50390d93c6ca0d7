use thiserror::Error;

/// Errors raised by the storage layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("clock error: {0}")]
    Clock(#[from] captureflow_clock::ClockError),

    #[error("no open recording")]
    NoOpenRecording,

    #[error("recording {0} not found")]
    RecordingNotFound(uuid::Uuid),

    #[error("capture directory already exists: {0}")]
    CaptureDirExists(std::path::PathBuf),
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

impl StorageError {
    /// Whether the caller can reasonably retry the operation that produced this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            StorageError::Database(sqlx::Error::PoolTimedOut)
                | StorageError::Database(sqlx::Error::Io(_))
        )
    }

    /// Whether this error reflects an unrecoverable, data-affecting failure that
    /// should downgrade a recording's outcome to `Partial`.
    pub fn is_data_loss(&self) -> bool {
        matches!(
            self,
            StorageError::Database(_) | StorageError::Migration(_) | StorageError::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_timeout_is_recoverable() {
        let err = StorageError::Database(sqlx::Error::PoolTimedOut);
        assert!(err.is_recoverable());
    }

    #[test]
    fn no_open_recording_is_not_recoverable() {
        let err = StorageError::NoOpenRecording;
        assert!(!err.is_recoverable());
    }

    #[test]
    fn database_error_is_data_loss() {
        let err = StorageError::Database(sqlx::Error::RowNotFound);
        assert!(err.is_data_loss());
    }
}
