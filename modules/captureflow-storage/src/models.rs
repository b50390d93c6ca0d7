use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::config::RecordingConfig;

/// One capture session. One row per `record` invocation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Recording {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub task_description: String,
    pub video_start_time: Option<DateTime<Utc>>,
    #[sqlx(json)]
    pub config: sqlx::types::Json<RecordingConfig>,
    pub platform: String,
    pub monitor_width: i64,
    pub monitor_height: i64,
}

impl Recording {
    pub fn new(
        task_description: impl Into<String>,
        timestamp: DateTime<Utc>,
        config: RecordingConfig,
        platform: impl Into<String>,
        monitor_width: i64,
        monitor_height: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp,
            task_description: task_description.into(),
            video_start_time: None,
            config: sqlx::types::Json(config),
            platform: platform.into(),
            monitor_width,
            monitor_height,
        }
    }
}

/// A single mouse or keyboard action, possibly later merged into a coarser
/// action (double click, drag, typed text) by the merge engine.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ActionEvent {
    pub id: Uuid,
    pub recording_id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Seconds elapsed since `Recording.timestamp`.
    pub recording_timestamp: f64,
    pub name: String,

    pub mouse_x: Option<f64>,
    pub mouse_y: Option<f64>,
    pub mouse_dx: Option<f64>,
    pub mouse_dy: Option<f64>,
    pub mouse_button_name: Option<String>,
    pub mouse_pressed: Option<bool>,

    pub key_name: Option<String>,
    pub key_char: Option<String>,
    pub key_vk: Option<i64>,
    pub canonical_key_name: Option<String>,
    pub canonical_key_char: Option<String>,
    pub canonical_key_vk: Option<i64>,

    /// `disabled` until the merge engine folds this raw event into a coarser one.
    pub disabled: bool,
    /// The id of the coarser event this raw event was folded into, if any.
    pub parent_id: Option<Uuid>,

    pub screenshot_id: Option<Uuid>,
    pub window_event_id: Option<Uuid>,
    pub browser_event_id: Option<Uuid>,
    pub browser_event_timestamp: Option<DateTime<Utc>>,

    /// Populated on typed-text merge results: the run of characters typed.
    pub active_segment_description: Option<String>,

    /// Populated on typed-text merge results: the individual keys typed, in order.
    #[sqlx(json)]
    pub keys: Option<sqlx::types::Json<Vec<String>>>,
}

impl ActionEvent {
    pub fn is_mouse(&self) -> bool {
        self.mouse_x.is_some() || self.mouse_button_name.is_some()
    }

    pub fn is_keyboard(&self) -> bool {
        self.key_name.is_some() || self.key_char.is_some()
    }
}

/// One captured video frame reference. The pixels themselves live in `video.mp4`;
/// this row records when the frame was taken so actions can be matched to it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Screenshot {
    pub id: Uuid,
    pub recording_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub recording_timestamp: f64,
    /// Present only when `record_images` was set for the recording.
    pub png_data: Option<Vec<u8>>,
    /// Visual diff against the previous screenshot. Not computed by this
    /// build (no previous-frame comparison is implemented), always `None`.
    pub png_diff_data: Option<Vec<u8>>,
    /// Mask of the changed region backing `png_diff_data`. Always `None` for
    /// the same reason.
    pub png_diff_mask_data: Option<Vec<u8>>,
}

/// Active-window metadata sampled on the window-poll cadence.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WindowEvent {
    pub id: Uuid,
    pub recording_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub recording_timestamp: f64,
    pub title: String,
    pub left: i64,
    pub top: i64,
    pub width: i64,
    pub height: i64,
    pub window_id: String,
}

/// Optional browser-relayed DOM event, received over the side channel.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BrowserEvent {
    pub id: Uuid,
    pub recording_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub recording_timestamp: f64,
    #[sqlx(json)]
    pub json_data: sqlx::types::Json<serde_json::Value>,
}

/// One captured narration clip. Speech-to-text transcription has no
/// corpus-grounded crate available and is left unpopulated; see `DESIGN.md`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AudioInfo {
    pub id: Uuid,
    pub recording_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub sample_rate: i64,
    /// WAV-encoded PCM bytes for the whole clip. Named `flac_data` to match
    /// the persisted schema's field name even though no FLAC encoder is used
    /// (see `DESIGN.md`).
    pub flac_data: Vec<u8>,
    pub transcribed_text: Option<String>,
    #[sqlx(json)]
    pub words_with_timestamps: Option<sqlx::types::Json<serde_json::Value>>,
}

/// One per-event latency measurement: time from capture to durable write.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PerformanceStat {
    pub id: Uuid,
    pub recording_id: Uuid,
    pub event_type: String,
    pub start_time: f64,
    pub end_time: f64,
    pub window_id: Option<String>,
}

/// One host process memory sample, taken on the same cadence as the window poll.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MemoryStat {
    pub id: Uuid,
    pub recording_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub memory_usage_bytes: i64,
}
