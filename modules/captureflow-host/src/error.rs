use thiserror::Error;

/// Errors raised while standing up or tearing down a recording.
#[derive(Error, Debug)]
pub enum HostError {
    #[error("storage error: {0}")]
    Storage(#[from] captureflow_storage::StorageError),

    #[error("clock error: {0}")]
    Clock(#[from] captureflow_clock::ClockError),

    #[error("reader error: {0}")]
    Reader(#[from] captureflow_readers::ReaderError),

    #[error("video error: {0}")]
    Video(#[from] captureflow_video::VideoError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("capture directory already exists: {0}")]
    CaptureDirExists(std::path::PathBuf),
}

/// Result type for host operations.
pub type Result<T> = std::result::Result<T, HostError>;
