use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::error::{Result, StorageError};
use crate::models::{
    ActionEvent, AudioInfo, BrowserEvent, MemoryStat, PerformanceStat, Recording, Screenshot,
    WindowEvent,
};

/// Owns the SQLite pool for a single recording's `recording.db`.
pub struct CaptureDatabase {
    pool: SqlitePool,
}

impl CaptureDatabase {
    /// Open (creating if absent) the database file at `path`.
    pub async fn open(path: impl AsRef<Path>, config: &StorageConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!(
            "sqlite://{}",
            path.as_ref().display()
        ))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Some(Duration::from_secs(60)))
            .test_before_acquire(true)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS recordings (
                id TEXT PRIMARY KEY,
                timestamp TEXT NOT NULL,
                task_description TEXT NOT NULL,
                video_start_time TEXT,
                config TEXT NOT NULL,
                platform TEXT NOT NULL,
                monitor_width INTEGER NOT NULL,
                monitor_height INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS action_events (
                id TEXT PRIMARY KEY,
                recording_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                recording_timestamp REAL NOT NULL,
                name TEXT NOT NULL,
                mouse_x REAL,
                mouse_y REAL,
                mouse_dx REAL,
                mouse_dy REAL,
                mouse_button_name TEXT,
                mouse_pressed INTEGER,
                key_name TEXT,
                key_char TEXT,
                key_vk INTEGER,
                canonical_key_name TEXT,
                canonical_key_char TEXT,
                canonical_key_vk INTEGER,
                disabled INTEGER NOT NULL DEFAULT 0,
                parent_id TEXT,
                screenshot_id TEXT,
                window_event_id TEXT,
                browser_event_id TEXT,
                browser_event_timestamp TEXT,
                active_segment_description TEXT,
                keys TEXT,
                FOREIGN KEY (recording_id) REFERENCES recordings (id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_action_events_recording_ts ON action_events (recording_id, timestamp)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS screenshots (
                id TEXT PRIMARY KEY,
                recording_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                recording_timestamp REAL NOT NULL,
                png_data BLOB,
                png_diff_data BLOB,
                png_diff_mask_data BLOB,
                FOREIGN KEY (recording_id) REFERENCES recordings (id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_screenshots_recording_ts ON screenshots (recording_id, timestamp)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS window_events (
                id TEXT PRIMARY KEY,
                recording_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                recording_timestamp REAL NOT NULL,
                title TEXT NOT NULL,
                left INTEGER NOT NULL,
                top INTEGER NOT NULL,
                width INTEGER NOT NULL,
                height INTEGER NOT NULL,
                window_id TEXT NOT NULL,
                FOREIGN KEY (recording_id) REFERENCES recordings (id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_window_events_recording_ts ON window_events (recording_id, timestamp)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS browser_events (
                id TEXT PRIMARY KEY,
                recording_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                recording_timestamp REAL NOT NULL,
                json_data TEXT NOT NULL,
                FOREIGN KEY (recording_id) REFERENCES recordings (id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS audio_info (
                id TEXT PRIMARY KEY,
                recording_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                sample_rate INTEGER NOT NULL,
                flac_data BLOB NOT NULL,
                transcribed_text TEXT,
                words_with_timestamps TEXT,
                FOREIGN KEY (recording_id) REFERENCES recordings (id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS performance_stats (
                id TEXT PRIMARY KEY,
                recording_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                start_time REAL NOT NULL,
                end_time REAL NOT NULL,
                window_id TEXT,
                FOREIGN KEY (recording_id) REFERENCES recordings (id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS memory_stats (
                id TEXT PRIMARY KEY,
                recording_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                memory_usage_bytes INTEGER NOT NULL,
                FOREIGN KEY (recording_id) REFERENCES recordings (id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn insert_recording(&self, recording: &Recording) -> Result<()> {
        sqlx::query(
            "INSERT INTO recordings (id, timestamp, task_description, video_start_time, config, platform, monitor_width, monitor_height)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(recording.id.to_string())
        .bind(recording.timestamp)
        .bind(&recording.task_description)
        .bind(recording.video_start_time)
        .bind(serde_json::to_string(&recording.config.0)?)
        .bind(&recording.platform)
        .bind(recording.monitor_width)
        .bind(recording.monitor_height)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_video_start_time(
        &self,
        recording_id: Uuid,
        video_start_time: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query("UPDATE recordings SET video_start_time = ? WHERE id = ?")
            .bind(video_start_time)
            .bind(recording_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Upsert rather than plain insert: the merge engine re-saves every row it
    /// touched (original rows with `disabled`/`parent_id` flipped, plus newly
    /// synthesized `click`/`drag`/`type` rows), and the originals already
    /// exist from when the writer first persisted them.
    pub async fn insert_action_event(&self, event: &ActionEvent) -> Result<()> {
        sqlx::query(
            "INSERT INTO action_events (
                id, recording_id, timestamp, recording_timestamp, name,
                mouse_x, mouse_y, mouse_dx, mouse_dy, mouse_button_name, mouse_pressed,
                key_name, key_char, key_vk, canonical_key_name, canonical_key_char, canonical_key_vk,
                disabled, parent_id, screenshot_id, window_event_id, browser_event_id,
                browser_event_timestamp, active_segment_description, keys
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                disabled = excluded.disabled,
                parent_id = excluded.parent_id,
                screenshot_id = excluded.screenshot_id,
                window_event_id = excluded.window_event_id,
                browser_event_id = excluded.browser_event_id,
                browser_event_timestamp = excluded.browser_event_timestamp,
                active_segment_description = excluded.active_segment_description,
                keys = excluded.keys",
        )
        .bind(event.id.to_string())
        .bind(event.recording_id.to_string())
        .bind(event.timestamp)
        .bind(event.recording_timestamp)
        .bind(&event.name)
        .bind(event.mouse_x)
        .bind(event.mouse_y)
        .bind(event.mouse_dx)
        .bind(event.mouse_dy)
        .bind(&event.mouse_button_name)
        .bind(event.mouse_pressed)
        .bind(&event.key_name)
        .bind(&event.key_char)
        .bind(event.key_vk)
        .bind(&event.canonical_key_name)
        .bind(&event.canonical_key_char)
        .bind(event.canonical_key_vk)
        .bind(event.disabled)
        .bind(event.parent_id.map(|id| id.to_string()))
        .bind(event.screenshot_id.map(|id| id.to_string()))
        .bind(event.window_event_id.map(|id| id.to_string()))
        .bind(event.browser_event_id.map(|id| id.to_string()))
        .bind(event.browser_event_timestamp)
        .bind(&event.active_segment_description)
        .bind(event.keys.as_ref().map(|k| serde_json::to_string(&k.0)).transpose()?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_screenshot(&self, screenshot: &Screenshot) -> Result<()> {
        sqlx::query(
            "INSERT INTO screenshots (id, recording_id, timestamp, recording_timestamp, png_data, png_diff_data, png_diff_mask_data)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(screenshot.id.to_string())
        .bind(screenshot.recording_id.to_string())
        .bind(screenshot.timestamp)
        .bind(screenshot.recording_timestamp)
        .bind(&screenshot.png_data)
        .bind(&screenshot.png_diff_data)
        .bind(&screenshot.png_diff_mask_data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_window_event(&self, event: &WindowEvent) -> Result<()> {
        sqlx::query(
            "INSERT INTO window_events (id, recording_id, timestamp, recording_timestamp, title, left, top, width, height, window_id)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(event.id.to_string())
        .bind(event.recording_id.to_string())
        .bind(event.timestamp)
        .bind(event.recording_timestamp)
        .bind(&event.title)
        .bind(event.left)
        .bind(event.top)
        .bind(event.width)
        .bind(event.height)
        .bind(&event.window_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_browser_event(&self, event: &BrowserEvent) -> Result<()> {
        sqlx::query(
            "INSERT INTO browser_events (id, recording_id, timestamp, recording_timestamp, json_data) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(event.id.to_string())
        .bind(event.recording_id.to_string())
        .bind(event.timestamp)
        .bind(event.recording_timestamp)
        .bind(serde_json::to_string(&event.json_data.0)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_audio_info(&self, info: &AudioInfo) -> Result<()> {
        sqlx::query(
            "INSERT INTO audio_info (id, recording_id, timestamp, sample_rate, flac_data, transcribed_text, words_with_timestamps)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(info.id.to_string())
        .bind(info.recording_id.to_string())
        .bind(info.timestamp)
        .bind(info.sample_rate)
        .bind(&info.flac_data)
        .bind(&info.transcribed_text)
        .bind(
            info.words_with_timestamps
                .as_ref()
                .map(|v| serde_json::to_string(&v.0))
                .transpose()?,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_performance_stat(&self, stat: &PerformanceStat) -> Result<()> {
        sqlx::query(
            "INSERT INTO performance_stats (id, recording_id, event_type, start_time, end_time, window_id) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(stat.id.to_string())
        .bind(stat.recording_id.to_string())
        .bind(&stat.event_type)
        .bind(stat.start_time)
        .bind(stat.end_time)
        .bind(&stat.window_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_memory_stat(&self, stat: &MemoryStat) -> Result<()> {
        sqlx::query(
            "INSERT INTO memory_stats (id, recording_id, timestamp, memory_usage_bytes) VALUES (?, ?, ?, ?)",
        )
        .bind(stat.id.to_string())
        .bind(stat.recording_id.to_string())
        .bind(stat.timestamp)
        .bind(stat.memory_usage_bytes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_recording(&self, id: Uuid) -> Result<Recording> {
        sqlx::query_as::<_, Recording>("SELECT * FROM recordings WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StorageError::RecordingNotFound(id))
    }

    pub async fn get_action_events(&self, recording_id: Uuid) -> Result<Vec<ActionEvent>> {
        Ok(sqlx::query_as::<_, ActionEvent>(
            "SELECT * FROM action_events WHERE recording_id = ? ORDER BY timestamp",
        )
        .bind(recording_id.to_string())
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn get_screenshots(&self, recording_id: Uuid) -> Result<Vec<Screenshot>> {
        Ok(sqlx::query_as::<_, Screenshot>(
            "SELECT * FROM screenshots WHERE recording_id = ? ORDER BY timestamp",
        )
        .bind(recording_id.to_string())
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn get_window_events(&self, recording_id: Uuid) -> Result<Vec<WindowEvent>> {
        Ok(sqlx::query_as::<_, WindowEvent>(
            "SELECT * FROM window_events WHERE recording_id = ? ORDER BY timestamp",
        )
        .bind(recording_id.to_string())
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn get_browser_events(&self, recording_id: Uuid) -> Result<Vec<BrowserEvent>> {
        Ok(sqlx::query_as::<_, BrowserEvent>(
            "SELECT * FROM browser_events WHERE recording_id = ? ORDER BY timestamp",
        )
        .bind(recording_id.to_string())
        .fetch_all(&self.pool)
        .await?)
    }

    /// Resolve each action event's `screenshot_id`/`window_event_id`/`browser_event_id`
    /// foreign keys by matching stored timestamps, exactly once after every writer
    /// has drained. Matches a screenshot/window/browser event whose timestamp is the
    /// latest one not after the action's timestamp.
    pub async fn post_process(&self, recording_id: Uuid) -> Result<usize> {
        let actions = self.get_action_events(recording_id).await?;
        let screenshots = self.get_screenshots(recording_id).await?;
        let windows = self.get_window_events(recording_id).await?;
        let browser_events = self.get_browser_events(recording_id).await?;

        let screenshot_map = timestamp_index(screenshots.iter().map(|s| (s.timestamp, s.id)));
        let window_map = timestamp_index(windows.iter().map(|w| (w.timestamp, w.id)));
        let browser_map = timestamp_index(browser_events.iter().map(|b| (b.timestamp, b.id)));

        let mut updated = 0;
        for action in &actions {
            let screenshot_id = latest_at_or_before(&screenshot_map, action.timestamp);
            let window_event_id = latest_at_or_before(&window_map, action.timestamp);
            let browser_event_id = latest_at_or_before(&browser_map, action.timestamp);

            if screenshot_id != action.screenshot_id
                || window_event_id != action.window_event_id
                || browser_event_id != action.browser_event_id
            {
                sqlx::query(
                    "UPDATE action_events SET screenshot_id = ?, window_event_id = ?, browser_event_id = ? WHERE id = ?",
                )
                .bind(screenshot_id.map(|id| id.to_string()))
                .bind(window_event_id.map(|id| id.to_string()))
                .bind(browser_event_id.map(|id| id.to_string()))
                .bind(action.id.to_string())
                .execute(&self.pool)
                .await?;
                updated += 1;
            }
        }

        Ok(updated)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn timestamp_index(
    entries: impl Iterator<Item = (DateTime<Utc>, Uuid)>,
) -> Vec<(DateTime<Utc>, Uuid)> {
    let mut index: Vec<_> = entries.collect();
    index.sort_by_key(|(ts, _)| *ts);
    index
}

fn latest_at_or_before(index: &[(DateTime<Utc>, Uuid)], at: DateTime<Utc>) -> Option<Uuid> {
    index
        .iter()
        .rev()
        .find(|(ts, _)| *ts <= at)
        .map(|(_, id)| *id)
}

#[allow(dead_code)]
fn _unused_hashmap_hint(_: HashMap<Uuid, Uuid>) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecordingConfig;
    use tempfile::TempDir;

    async fn open_test_db() -> (TempDir, CaptureDatabase) {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("recording.db");
        let db = CaptureDatabase::open(&db_path, &StorageConfig::default())
            .await
            .unwrap();
        (dir, db)
    }

    #[tokio::test]
    async fn insert_and_fetch_recording_round_trips() {
        let (_dir, db) = open_test_db().await;
        let recording = Recording::new(
            "write a memo",
            Utc::now(),
            RecordingConfig::default(),
            "linux",
            1920,
            1080,
        );
        db.insert_recording(&recording).await.unwrap();

        let fetched = db.get_recording(recording.id).await.unwrap();
        assert_eq!(fetched.task_description, "write a memo");
        assert_eq!(fetched.monitor_width, 1920);
    }

    #[tokio::test]
    async fn post_process_resolves_nearest_preceding_screenshot() {
        let (_dir, db) = open_test_db().await;
        let recording = Recording::new(
            "click something",
            Utc::now(),
            RecordingConfig::default(),
            "linux",
            1920,
            1080,
        );
        db.insert_recording(&recording).await.unwrap();

        let base = recording.timestamp;
        let screenshot = Screenshot {
            id: Uuid::new_v4(),
            recording_id: recording.id,
            timestamp: base + chrono::Duration::milliseconds(10),
            recording_timestamp: 0.01,
            png_data: None,
            png_diff_data: None,
            png_diff_mask_data: None,
        };
        db.insert_screenshot(&screenshot).await.unwrap();

        let action = ActionEvent {
            id: Uuid::new_v4(),
            recording_id: recording.id,
            timestamp: base + chrono::Duration::milliseconds(20),
            recording_timestamp: 0.02,
            name: "click".into(),
            mouse_x: Some(10.0),
            mouse_y: Some(20.0),
            mouse_dx: None,
            mouse_dy: None,
            mouse_button_name: Some("left".into()),
            mouse_pressed: Some(true),
            key_name: None,
            key_char: None,
            key_vk: None,
            canonical_key_name: None,
            canonical_key_char: None,
            canonical_key_vk: None,
            disabled: false,
            parent_id: None,
            screenshot_id: None,
            window_event_id: None,
            browser_event_id: None,
            browser_event_timestamp: None,
            active_segment_description: None,
            keys: None,
        };
        db.insert_action_event(&action).await.unwrap();

        let updated = db.post_process(recording.id).await.unwrap();
        assert_eq!(updated, 1);

        let events = db.get_action_events(recording.id).await.unwrap();
        assert_eq!(events[0].screenshot_id, Some(screenshot.id));
    }
}
