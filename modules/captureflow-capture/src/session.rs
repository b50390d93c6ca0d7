use std::path::{Path, PathBuf};

use captureflow_storage::{ActionEvent, CaptureDatabase, Recording, StorageConfig};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{CaptureError, Result};

/// A merged, human-readable action: a click, double click, drag, or run of
/// typed text, paired with the screenshot and window context the router
/// gated alongside it.
#[derive(Debug, Clone)]
pub struct Action {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub text: Option<String>,
    pub mouse_x: Option<f64>,
    pub mouse_y: Option<f64>,
}

impl From<ActionEvent> for Action {
    fn from(event: ActionEvent) -> Self {
        Self {
            id: event.id,
            timestamp: event.timestamp,
            name: event.name,
            text: event.active_segment_description,
            mouse_x: event.mouse_x,
            mouse_y: event.mouse_y,
        }
    }
}

/// Read-only handle onto a finished recording's `capture_dir`.
pub struct CaptureSession {
    db: CaptureDatabase,
    recording: Recording,
    capture_dir: PathBuf,
}

impl CaptureSession {
    /// Open `capture_dir/recording.db` and load its `Recording` row.
    pub async fn open(capture_dir: impl AsRef<Path>) -> Result<Self> {
        let capture_dir = capture_dir.as_ref().to_path_buf();
        let db_path = capture_dir.join("recording.db");
        if !db_path.exists() {
            return Err(CaptureError::MissingDatabase(db_path));
        }

        let db = CaptureDatabase::open(&db_path, &StorageConfig::default()).await?;
        let recordings = sqlx::query_as::<_, Recording>("SELECT * FROM recordings LIMIT 1")
            .fetch_one(db.pool())
            .await
            .map_err(captureflow_storage::StorageError::Database)?;

        Ok(Self {
            db,
            recording: recordings,
            capture_dir,
        })
    }

    pub fn recording(&self) -> &Recording {
        &self.recording
    }

    /// Path to this recording's `video.mp4`, if one was ever produced.
    pub fn video_path(&self) -> Option<PathBuf> {
        let path = self.capture_dir.join("video.mp4");
        path.exists().then_some(path)
    }

    /// Every raw, unmerged event this recording captured, in timestamp order
    /// — including rows the merge engine later disabled.
    pub async fn raw_events(&self) -> Result<Vec<ActionEvent>> {
        Ok(self.db.get_action_events(self.recording.id).await?)
    }

    /// The merged, human-scale actions: clicks, double clicks, drags, and
    /// typed-text runs. Raw `mouse_move` events are excluded unless
    /// `include_moves` is set — they are rarely useful on their own once a
    /// drag has absorbed the moves that mattered.
    pub async fn actions(&self, include_moves: bool) -> Result<Vec<Action>> {
        let events = self.raw_events().await?;
        Ok(events
            .into_iter()
            .filter(|e| !e.disabled)
            .filter(|e| include_moves || e.name != "mouse_move")
            .map(Action::from)
            .collect())
    }

    /// Seconds into `video.mp4` the frame nearest `at` (within `tolerance`
    /// seconds) was captured at, if any screenshot row matches.
    pub async fn frame_offset_at(&self, at: DateTime<Utc>, tolerance_secs: f64) -> Result<Option<f64>> {
        let Some(video_start) = self.recording.video_start_time else {
            return Err(CaptureError::NoVideoStart);
        };

        let screenshots = self.db.get_screenshots(self.recording.id).await?;
        let nearest = screenshots
            .into_iter()
            .map(|s| (s.timestamp, (s.timestamp - at).num_milliseconds().abs()))
            .min_by_key(|(_, delta)| *delta);

        match nearest {
            Some((ts, delta_ms)) if (delta_ms as f64 / 1000.0) <= tolerance_secs => {
                Ok(Some((ts - video_start).num_milliseconds() as f64 / 1000.0))
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use captureflow_storage::{RecordingConfig, Screenshot};
    use tempfile::TempDir;

    async fn seeded_session() -> (TempDir, CaptureSession) {
        let dir = TempDir::new().unwrap();
        let capture_dir = dir.path().join("rec");
        std::fs::create_dir_all(&capture_dir).unwrap();

        let db = CaptureDatabase::open(capture_dir.join("recording.db"), &StorageConfig::default())
            .await
            .unwrap();
        let mut recording = Recording::new(
            "demo task",
            Utc::now(),
            RecordingConfig::default(),
            "linux",
            1920,
            1080,
        );
        recording.video_start_time = Some(recording.timestamp);
        db.insert_recording(&recording).await.unwrap();
        db.insert_screenshot(&Screenshot {
            id: Uuid::new_v4(),
            recording_id: recording.id,
            timestamp: recording.timestamp + chrono::Duration::milliseconds(500),
            recording_timestamp: 0.5,
            png_data: None,
            png_diff_data: None,
            png_diff_mask_data: None,
        })
        .await
        .unwrap();
        db.close().await;

        let session = CaptureSession::open(&capture_dir).await.unwrap();
        (dir, session)
    }

    #[tokio::test]
    async fn opens_and_reads_back_the_recording_row() {
        let (_dir, session) = seeded_session().await;
        assert_eq!(session.recording().task_description, "demo task");
    }

    #[tokio::test]
    async fn frame_offset_matches_within_tolerance() {
        let (_dir, session) = seeded_session().await;
        let at = session.recording().timestamp + chrono::Duration::milliseconds(520);
        let offset = session.frame_offset_at(at, 0.5).await.unwrap();
        assert!(offset.is_some());
    }

    #[tokio::test]
    async fn frame_offset_none_outside_tolerance() {
        let (_dir, session) = seeded_session().await;
        let at = session.recording().timestamp + chrono::Duration::seconds(10);
        let offset = session.frame_offset_at(at, 0.5).await.unwrap();
        assert!(offset.is_none());
    }
}
