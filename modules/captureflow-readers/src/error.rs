use thiserror::Error;

/// Errors raised by a reader.
#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("failed to start input hook: {0:?}")]
    InputHook(rdev::ListenError),

    #[error("no monitors found")]
    NoMonitors,

    #[error("screen capture failed: {0}")]
    ScreenCapture(String),

    #[error("window query failed: {0}")]
    WindowQuery(String),

    #[error("no audio input device available")]
    NoAudioDevice,

    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("inbox channel disconnected")]
    Disconnected,
}

/// Result type for reader operations.
pub type Result<T> = std::result::Result<T, ReaderError>;

impl ReaderError {
    /// Whether the reader can keep running after logging this error, versus
    /// needing to stop and let the host record a partial outcome.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ReaderError::ScreenCapture(_) | ReaderError::WindowQuery(_))
    }
}
