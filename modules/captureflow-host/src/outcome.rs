use std::path::PathBuf;

use uuid::Uuid;

/// How a recording ended, surfaced to the CLI and to callers of
/// `captureflow-capture`'s reader API.
#[derive(Debug, Clone)]
pub enum RecordingOutcome {
    /// Every reader and writer drained cleanly and the video encoder
    /// finalized successfully.
    Clean {
        recording_id: Uuid,
        capture_dir: PathBuf,
    },
    /// One or more writers failed to shut down within their join timeout, or
    /// a non-fatal storage error occurred; the recording directory is usable
    /// but may be missing some events.
    Partial {
        recording_id: Uuid,
        capture_dir: PathBuf,
        reason: String,
    },
    /// Everything but the video encoder finalized cleanly — metadata and
    /// events are intact but `video.mp4` may be truncated or absent.
    VideoPartial {
        recording_id: Uuid,
        capture_dir: PathBuf,
        reason: String,
    },
}

impl RecordingOutcome {
    pub fn recording_id(&self) -> Uuid {
        match self {
            RecordingOutcome::Clean { recording_id, .. }
            | RecordingOutcome::Partial { recording_id, .. }
            | RecordingOutcome::VideoPartial { recording_id, .. } => *recording_id,
        }
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, RecordingOutcome::Clean { .. })
    }
}
