use std::sync::Arc;
use std::time::Duration;

use captureflow_clock::Clock;
use captureflow_storage::{
    ActionEvent, BrowserEvent, CaptureDatabase, MemoryStat, PerformanceStat, WindowEvent,
};
use crossbeam_channel::Receiver;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::event::{
    PersistedAction, RawActionEvent, RawBrowserEvent, RawMemoryStat, RawScreenFrame,
    RawWindowSnapshot, WriterItem,
};

/// How long the host will wait for an ordinary writer to drain and exit once
/// it has received the sentinel.
pub const WRITER_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// A writer's outcome when its queue closes: how many rows it persisted and
/// whether it drained cleanly.
#[derive(Debug, Default)]
pub struct WriterReport {
    pub rows_written: u64,
    pub errors: u64,
}

/// Record the latency from event capture to durable write, the per-event
/// measurement `performance_stats` exists to hold.
async fn record_perf(
    db: &CaptureDatabase,
    recording_id: Uuid,
    event_type: &str,
    start_time: f64,
    end_time: f64,
    window_id: Option<String>,
) {
    let stat = PerformanceStat {
        id: Uuid::new_v4(),
        recording_id,
        event_type: event_type.to_string(),
        start_time,
        end_time,
        window_id,
    };
    if let Err(e) = db.insert_performance_stat(&stat).await {
        warn!(error = %e, "failed to write performance stat");
    }
}

/// Spawn a blocking task that drains `rx`, inserting one row per
/// [`PersistedAction`] until it observes [`WriterItem::Sentinel`].
pub fn spawn_action_writer(
    rx: Receiver<WriterItem<PersistedAction>>,
    db: Arc<CaptureDatabase>,
    recording_id: Uuid,
    clock: Clock,
    runtime: tokio::runtime::Handle,
) -> std::thread::JoinHandle<WriterReport> {
    std::thread::spawn(move || {
        let mut report = WriterReport::default();
        for item in rx.iter() {
            let persisted = match item {
                WriterItem::Sentinel => break,
                WriterItem::Event(e) => e,
            };
            let event = persisted.event;
            let recording_timestamp = match clock.seconds_since_start(event.timestamp) {
                Ok(s) => s,
                Err(e) => {
                    warn!(error = %e, "clock unavailable while writing action event");
                    report.errors += 1;
                    continue;
                }
            };

            let row = ActionEvent {
                id: persisted.id,
                recording_id,
                timestamp: event.timestamp,
                recording_timestamp,
                name: event.name,
                mouse_x: event.mouse_x,
                mouse_y: event.mouse_y,
                mouse_dx: event.mouse_dx,
                mouse_dy: event.mouse_dy,
                mouse_button_name: event.mouse_button_name,
                mouse_pressed: event.mouse_pressed,
                key_name: event.key_name,
                key_char: event.key_char,
                key_vk: event.key_vk,
                canonical_key_name: event.canonical_key_name,
                canonical_key_char: event.canonical_key_char,
                canonical_key_vk: event.canonical_key_vk,
                disabled: false,
                parent_id: None,
                screenshot_id: None,
                window_event_id: None,
                browser_event_id: None,
                browser_event_timestamp: None,
                active_segment_description: None,
            };

            match runtime.block_on(db.insert_action_event(&row)) {
                Ok(()) => {
                    report.rows_written += 1;
                    let end_time = clock
                        .now()
                        .and_then(|now| clock.seconds_since_start(now))
                        .unwrap_or(row.recording_timestamp);
                    runtime.block_on(record_perf(&db, recording_id, &row.name, row.recording_timestamp, end_time, None));
                }
                Err(e) => {
                    error!(error = %e, "failed to write action event");
                    report.errors += 1;
                }
            }
        }
        debug!(rows = report.rows_written, errors = report.errors, "action writer drained");
        report
    })
}

/// Spawn the screenshot writer. Video frames go to the video encoder
/// regardless; this writer additionally PNG-encodes the frame into
/// `png_data` when one is attached (`RECORD_IMAGES`).
pub fn spawn_screenshot_writer(
    rx: Receiver<WriterItem<(Uuid, chrono::DateTime<chrono::Utc>, Option<RawScreenFrame>)>>,
    db: Arc<CaptureDatabase>,
    recording_id: Uuid,
    clock: Clock,
    runtime: tokio::runtime::Handle,
) -> std::thread::JoinHandle<WriterReport> {
    std::thread::spawn(move || {
        let mut report = WriterReport::default();
        for item in rx.iter() {
            let (id, timestamp, frame) = match item {
                WriterItem::Sentinel => break,
                WriterItem::Event(e) => e,
            };
            let recording_timestamp = clock.seconds_since_start(timestamp).unwrap_or(0.0);
            let png_data = frame.and_then(|frame| match encode_png(&frame) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    warn!(error = %e, "failed to PNG-encode screenshot, storing reference only");
                    None
                }
            });
            let row = captureflow_storage::Screenshot {
                id,
                recording_id,
                timestamp,
                recording_timestamp,
                png_data,
                png_diff_data: None,
                png_diff_mask_data: None,
            };
            match runtime.block_on(db.insert_screenshot(&row)) {
                Ok(()) => report.rows_written += 1,
                Err(e) => {
                    error!(error = %e, "failed to write screenshot reference");
                    report.errors += 1;
                }
            }
        }
        report
    })
}

fn encode_png(frame: &RawScreenFrame) -> Result<Vec<u8>, image::ImageError> {
    let image = image::RgbaImage::from_raw(frame.width, frame.height, frame.rgba.to_vec())
        .ok_or_else(|| image::ImageError::Parameter(image::error::ParameterError::from_kind(
            image::error::ParameterErrorKind::DimensionMismatch,
        )))?;
    let mut bytes = Vec::new();
    image.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)?;
    Ok(bytes)
}

pub fn spawn_window_writer(
    rx: Receiver<WriterItem<RawWindowSnapshot>>,
    db: Arc<CaptureDatabase>,
    recording_id: Uuid,
    clock: Clock,
    runtime: tokio::runtime::Handle,
) -> std::thread::JoinHandle<WriterReport> {
    std::thread::spawn(move || {
        let mut report = WriterReport::default();
        for item in rx.iter() {
            let snapshot = match item {
                WriterItem::Sentinel => break,
                WriterItem::Event(e) => e,
            };
            let recording_timestamp = clock.seconds_since_start(snapshot.timestamp).unwrap_or(0.0);
            let row = WindowEvent {
                id: Uuid::new_v4(),
                recording_id,
                timestamp: snapshot.timestamp,
                recording_timestamp,
                title: snapshot.title,
                left: snapshot.left,
                top: snapshot.top,
                width: snapshot.width,
                height: snapshot.height,
                window_id: snapshot.window_id,
            };
            match runtime.block_on(db.insert_window_event(&row)) {
                Ok(()) => {
                    report.rows_written += 1;
                    let end_time = clock
                        .now()
                        .and_then(|now| clock.seconds_since_start(now))
                        .unwrap_or(row.recording_timestamp);
                    runtime.block_on(record_perf(
                        &db,
                        recording_id,
                        "window",
                        row.recording_timestamp,
                        end_time,
                        Some(row.window_id.clone()),
                    ));
                }
                Err(e) => {
                    error!(error = %e, "failed to write window event");
                    report.errors += 1;
                }
            }
        }
        report
    })
}

pub fn spawn_browser_writer(
    rx: Receiver<WriterItem<RawBrowserEvent>>,
    db: Arc<CaptureDatabase>,
    recording_id: Uuid,
    clock: Clock,
    runtime: tokio::runtime::Handle,
) -> std::thread::JoinHandle<WriterReport> {
    std::thread::spawn(move || {
        let mut report = WriterReport::default();
        for item in rx.iter() {
            let event = match item {
                WriterItem::Sentinel => break,
                WriterItem::Event(e) => e,
            };
            let recording_timestamp = clock.seconds_since_start(event.timestamp).unwrap_or(0.0);
            let row = BrowserEvent {
                id: Uuid::new_v4(),
                recording_id,
                timestamp: event.timestamp,
                recording_timestamp,
                json_data: sqlx::types::Json(event.json_data),
            };
            match runtime.block_on(db.insert_browser_event(&row)) {
                Ok(()) => report.rows_written += 1,
                Err(e) => {
                    error!(error = %e, "failed to write browser event");
                    report.errors += 1;
                }
            }
        }
        report
    })
}

pub fn spawn_memory_writer(
    rx: Receiver<WriterItem<RawMemoryStat>>,
    db: Arc<CaptureDatabase>,
    recording_id: Uuid,
    runtime: tokio::runtime::Handle,
) -> std::thread::JoinHandle<WriterReport> {
    std::thread::spawn(move || {
        let mut report = WriterReport::default();
        for item in rx.iter() {
            let stat = match item {
                WriterItem::Sentinel => break,
                WriterItem::Event(e) => e,
            };
            let row = MemoryStat {
                id: Uuid::new_v4(),
                recording_id,
                timestamp: stat.timestamp,
                memory_usage_bytes: stat.memory_usage_bytes,
            };
            match runtime.block_on(db.insert_memory_stat(&row)) {
                Ok(()) => report.rows_written += 1,
                Err(e) => {
                    error!(error = %e, "failed to write memory stat");
                    report.errors += 1;
                }
            }
        }
        report
    })
}
