use thiserror::Error;

/// Errors raised by the router and writers.
#[derive(Error, Debug)]
pub enum RouterError {
    #[error("storage error: {0}")]
    Storage(#[from] captureflow_storage::StorageError),

    #[error("clock error: {0}")]
    Clock(#[from] captureflow_clock::ClockError),

    #[error("writer channel disconnected: {0}")]
    ChannelDisconnected(&'static str),

    #[error("writer {0} did not shut down within its timeout")]
    WriterTimedOut(&'static str),
}

/// Result type for router operations.
pub type Result<T> = std::result::Result<T, RouterError>;

impl RouterError {
    /// Whether this failure should be treated as fatal for the recording as a
    /// whole, versus tolerated with a logged warning (e.g. a single insert
    /// failure that doesn't corrupt downstream state).
    pub fn is_shutdown(&self) -> bool {
        matches!(self, RouterError::WriterTimedOut(_) | RouterError::ChannelDisconnected(_))
    }
}
