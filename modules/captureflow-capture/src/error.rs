use thiserror::Error;

/// Errors raised when reading back a finished recording.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("storage error: {0}")]
    Storage(#[from] captureflow_storage::StorageError),

    #[error("capture directory has no recording.db: {0}")]
    MissingDatabase(std::path::PathBuf),

    #[error("recording has no video_start_time; it may have ended before any frame was gated")]
    NoVideoStart,
}

/// Result type for capture-session operations.
pub type Result<T> = std::result::Result<T, CaptureError>;
