use thiserror::Error;

/// Errors raised by the video encoder.
#[derive(Error, Debug)]
pub enum VideoError {
    #[error("encoder error: {0}")]
    Encoder(#[from] video_rs::Error),

    #[error("encoder was never initialized with a first frame")]
    NotInitialized,

    #[error("finalize timed out after {0:?}")]
    FinalizeTimedOut(std::time::Duration),

    #[error("frame buffer shape mismatch: {0}")]
    FrameShape(String),
}

/// Result type for video encoder operations.
pub type Result<T> = std::result::Result<T, VideoError>;
