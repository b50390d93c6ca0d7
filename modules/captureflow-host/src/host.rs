use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use captureflow_clock::Clock;
use captureflow_merge::merge_events;
use captureflow_readers::{AudioReader, InputReader, MemoryReader, ScreenReader, StopSequence, WindowReader};
use captureflow_router::{
    inbox, spawn_action_writer, spawn_browser_writer, spawn_memory_writer,
    spawn_screenshot_writer, spawn_window_writer, Dispatch, Router, WriterItem,
    WRITER_JOIN_TIMEOUT,
};
use captureflow_storage::{AudioInfo, CaptureDatabase, Recording, RecordingConfig, StorageConfig};
use captureflow_video::{VideoEncoder, FINALIZE_JOIN_TIMEOUT};
use crossbeam_channel::RecvTimeoutError;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{HostError, Result};
use crate::join::join_with_timeout;
use crate::outcome::RecordingOutcome;

/// Everything needed to start one recording.
pub struct RecordRequest {
    pub task_description: String,
    pub capture_root: PathBuf,
    pub config: RecordingConfig,
    pub monitor_width: i64,
    pub monitor_height: i64,
}

/// Stand up the full capture pipeline, block until the recording ends (either
/// the in-stream stop sequence or `terminate` being set externally), tear
/// everything down, run post-processing and the merge engine, and report how
/// it went.
pub async fn record(request: RecordRequest, terminate: Arc<AtomicBool>) -> Result<RecordingOutcome> {
    let clock = Clock::new();
    let wall_start = clock.anchor()?;
    let config = &request.config;

    let recording_id = Uuid::new_v4();
    let capture_dir = request.capture_root.join(recording_id.to_string());
    if capture_dir.exists() {
        return Err(HostError::CaptureDirExists(capture_dir));
    }
    std::fs::create_dir_all(&capture_dir)?;

    let storage_config = StorageConfig::default();
    let db = Arc::new(
        CaptureDatabase::open(capture_dir.join("recording.db"), &storage_config).await?,
    );

    let recording = Recording::new(
        request.task_description.clone(),
        wall_start,
        config.clone(),
        std::env::consts::OS,
        request.monitor_width,
        request.monitor_height,
    );
    db.insert_recording(&recording).await?;
    info!(%recording_id, dir = %capture_dir.display(), "recording started");

    let (inbox_tx, inbox_rx) = inbox();

    let (action_tx, action_rx) = crossbeam_channel::unbounded();
    let (screenshot_tx, screenshot_rx) = crossbeam_channel::unbounded();
    let (window_tx, window_rx) = crossbeam_channel::unbounded();
    let (browser_tx, browser_rx) = crossbeam_channel::unbounded();
    let (memory_tx, memory_rx) = crossbeam_channel::unbounded();
    let (video_tx, video_rx) = crossbeam_channel::unbounded::<WriterItem<(captureflow_router::RawScreenFrame, bool)>>();

    let runtime = tokio::runtime::Handle::current();

    let action_writer = spawn_action_writer(action_rx, db.clone(), recording_id, clock.clone(), runtime.clone());
    let browser_writer = spawn_browser_writer(browser_rx, db.clone(), recording_id, clock.clone(), runtime.clone());

    let screenshot_writer = config.record_video.then(|| {
        spawn_screenshot_writer(screenshot_rx, db.clone(), recording_id, clock.clone(), runtime.clone())
    });
    let window_writer = config.record_window_data.then(|| {
        spawn_window_writer(window_rx, db.clone(), recording_id, clock.clone(), runtime.clone())
    });
    let memory_writer = config
        .log_memory
        .then(|| spawn_memory_writer(memory_rx, db.clone(), recording_id, runtime.clone()));

    let video_thread = config.record_video.then(|| {
        let video_path = capture_dir.join("video.mp4");
        let fps = config.video_fps;
        let video_config = config.clone();
        let db_for_video = db.clone();
        let runtime = runtime.clone();
        std::thread::spawn(move || {
            let mut encoder: Option<VideoEncoder> = None;
            for item in video_rx.iter() {
                let (frame, force_key_frame) = match item {
                    WriterItem::Sentinel => break,
                    WriterItem::Event(e) => e,
                };
                let enc = match &mut encoder {
                    Some(enc) => enc,
                    None => {
                        match VideoEncoder::create(&video_path, frame.width, frame.height, fps, &video_config) {
                            Ok(enc) => encoder.insert(enc),
                            Err(e) => {
                                warn!(error = %e, "failed to create video encoder");
                                continue;
                            }
                        }
                    }
                };
                if let Err(e) = enc.write_frame(frame, force_key_frame) {
                    warn!(error = %e, "failed to write video frame");
                }
            }

            match encoder {
                Some(enc) => {
                    let video_start = enc.video_start_timestamp();
                    match enc.finalize() {
                        Ok(_) => {
                            if let Some(start) = video_start {
                                let _ = runtime.block_on(db_for_video.update_video_start_time(recording_id, start));
                            }
                            Ok(())
                        }
                        Err(e) => Err(e.to_string()),
                    }
                }
                None => Ok(()), // no frames were ever gated, e.g. an empty recording
            }
        })
    });
    // Dropped rather than leaked when video recording is off: the router never
    // emits `Dispatch::VideoFrame` in that case, so nothing would ever send here.
    if video_thread.is_none() {
        drop(video_tx);
    }

    let stop_sequence = if config.stop_sequences.is_empty() {
        StopSequence::default_sequence()
    } else {
        StopSequence::new(config.stop_sequences.clone())
    };

    let input_thread = {
        let tx = inbox_tx.clone();
        let term = terminate.clone();
        let clock = clock.clone();
        std::thread::spawn(move || InputReader::new(stop_sequence, clock).run(tx, term))
    };
    let screen_thread = config.record_video.then(|| {
        let tx = inbox_tx.clone();
        let term = terminate.clone();
        let clock = clock.clone();
        let hz = 2.0 * config.video_fps as f64;
        std::thread::spawn(move || ScreenReader::new(hz, clock).run(tx, term))
    });
    let window_thread = config.record_window_data.then(|| {
        let tx = inbox_tx.clone();
        let term = terminate.clone();
        let clock = clock.clone();
        let hz = config.window_poll_hz;
        std::thread::spawn(move || WindowReader::new(hz, clock).run(tx, term))
    });
    let memory_thread = config.log_memory.then(|| {
        let tx = inbox_tx.clone();
        let term = terminate.clone();
        let clock = clock.clone();
        std::thread::spawn(move || MemoryReader::new(1.0, clock).run(tx, term))
    });
    let audio_thread = config.record_audio.then(|| {
        let term = terminate.clone();
        let clock = clock.clone();
        let sample_rate = config.audio_sample_rate;
        std::thread::spawn(move || AudioReader::new(sample_rate, clock).run(term))
    });

    drop(inbox_tx);

    let router_terminate = terminate.clone();
    let router_config = config.clone();
    let router_handle = std::thread::spawn(move || {
        let mut router = Router::new(&router_config);
        loop {
            match inbox_rx.recv_timeout(Duration::from_millis(200)) {
                Ok(event) => {
                    for dispatch in router.route(event) {
                        forward(
                            dispatch,
                            &action_tx,
                            &screenshot_tx,
                            &video_tx,
                            &window_tx,
                            &browser_tx,
                            &memory_tx,
                        );
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    if router_terminate.load(Ordering::Relaxed) && inbox_rx.is_empty() {
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let _ = action_tx.send(WriterItem::Sentinel);
        let _ = screenshot_tx.send(WriterItem::Sentinel);
        let _ = window_tx.send(WriterItem::Sentinel);
        let _ = video_tx.send(WriterItem::Sentinel);
        let _ = browser_tx.send(WriterItem::Sentinel);
        let _ = memory_tx.send(WriterItem::Sentinel);

        router.counts()
    });

    while !terminate.load(Ordering::Relaxed) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    if join_with_timeout(input_thread, Duration::from_secs(1)).is_none() {
        warn!("input reader did not stop promptly after the stop sequence");
    }
    if let Some(handle) = screen_thread {
        if join_with_timeout(handle, Duration::from_secs(1)).is_none() {
            warn!("screen reader did not stop promptly");
        }
    }
    if let Some(handle) = window_thread {
        if join_with_timeout(handle, Duration::from_secs(1)).is_none() {
            warn!("window reader did not stop promptly");
        }
    }
    if let Some(handle) = memory_thread {
        if join_with_timeout(handle, Duration::from_secs(1)).is_none() {
            warn!("memory reader did not stop promptly");
        }
    }

    let mut partial_reason = None;

    if join_with_timeout(router_handle, Duration::from_secs(5)).is_none() {
        partial_reason = Some("router did not drain within its shutdown timeout".to_string());
    }

    for (name, handle) in [
        ("action", Some(action_writer)),
        ("screenshot", screenshot_writer),
        ("window", window_writer),
        ("browser", Some(browser_writer)),
        ("memory", memory_writer),
    ] {
        let Some(handle) = handle else { continue };
        if join_with_timeout(handle, WRITER_JOIN_TIMEOUT).is_none() {
            warn!(writer = name, "writer did not shut down within its timeout");
            partial_reason.get_or_insert_with(|| format!("{name} writer timed out"));
        }
    }

    // `None` means video recording was off for this recording, not a timeout.
    let video_outcome: Option<Option<std::result::Result<(), String>>> =
        video_thread.map(|handle| join_with_timeout(handle, FINALIZE_JOIN_TIMEOUT));

    if let Some(handle) = audio_thread {
        match join_with_timeout(handle, FINALIZE_JOIN_TIMEOUT) {
            Some(Ok(capture)) => {
                let samples = capture.samples.len();
                match encode_wav(&capture.samples, capture.sample_rate) {
                    Ok(flac_data) => {
                        let info = AudioInfo {
                            id: Uuid::new_v4(),
                            recording_id,
                            timestamp: capture.started_at,
                            sample_rate: capture.sample_rate as i64,
                            flac_data,
                            transcribed_text: None,
                            words_with_timestamps: None,
                        };
                        if let Err(e) = db.insert_audio_info(&info).await {
                            warn!(error = %e, "failed to write audio track");
                            partial_reason.get_or_insert_with(|| "audio track failed to persist".to_string());
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to encode captured audio");
                        partial_reason.get_or_insert_with(|| "audio encoding failed".to_string());
                    }
                }
                info!(samples, "audio capture finished");
            }
            Some(Err(e)) => {
                warn!(error = %e, "audio capture failed");
                partial_reason.get_or_insert_with(|| "audio capture failed".to_string());
            }
            None => {
                warn!("audio capture did not stop promptly");
                partial_reason.get_or_insert_with(|| "audio capture did not stop promptly".to_string());
            }
        }
    }

    db.post_process(recording_id).await?;

    let events = db.get_action_events(recording_id).await?;
    let merge_outcome = merge_events(events, config);
    info!(
        clicks = merge_outcome.clicks_merged,
        double_clicks = merge_outcome.double_clicks_merged,
        drags = merge_outcome.drags_merged,
        typed_runs = merge_outcome.typed_runs_merged,
        "merge engine complete"
    );
    for event in &merge_outcome.events {
        db.insert_action_event(event).await?;
    }

    db.close().await;

    match video_outcome {
        Some(None) => Ok(RecordingOutcome::VideoPartial {
            recording_id,
            capture_dir,
            reason: "video encoder did not finalize within its timeout".to_string(),
        }),
        Some(Some(Err(reason))) => Ok(RecordingOutcome::VideoPartial {
            recording_id,
            capture_dir,
            reason,
        }),
        Some(Some(Ok(()))) | None => match partial_reason {
            Some(reason) => Ok(RecordingOutcome::Partial {
                recording_id,
                capture_dir,
                reason,
            }),
            None => Ok(RecordingOutcome::Clean {
                recording_id,
                capture_dir,
            }),
        },
    }
}

/// Encodes mono 16-bit PCM samples to an in-memory WAV container. There is no
/// FLAC encoder anywhere in this project's dependency stack, so the
/// `AudioInfo.flac_data` column holds WAV bytes instead (see `DESIGN.md`).
fn encode_wav(samples: &[i16], sample_rate: u32) -> std::io::Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut bytes = Vec::new();
    {
        let mut writer = hound::WavWriter::new(std::io::Cursor::new(&mut bytes), spec)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        }
        writer
            .finalize()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    }
    Ok(bytes)
}

#[allow(clippy::too_many_arguments)]
fn forward(
    dispatch: Dispatch,
    action_tx: &crossbeam_channel::Sender<WriterItem<captureflow_router::PersistedAction>>,
    screenshot_tx: &crossbeam_channel::Sender<
        WriterItem<(Uuid, chrono::DateTime<chrono::Utc>, Option<captureflow_router::RawScreenFrame>)>,
    >,
    video_tx: &crossbeam_channel::Sender<WriterItem<(captureflow_router::RawScreenFrame, bool)>>,
    window_tx: &crossbeam_channel::Sender<WriterItem<captureflow_router::RawWindowSnapshot>>,
    browser_tx: &crossbeam_channel::Sender<WriterItem<captureflow_router::RawBrowserEvent>>,
    memory_tx: &crossbeam_channel::Sender<WriterItem<captureflow_router::RawMemoryStat>>,
) {
    match dispatch {
        Dispatch::Action(action) => {
            let _ = action_tx.send(WriterItem::Event(action));
        }
        Dispatch::Screenshot { id, timestamp, frame } => {
            let _ = screenshot_tx.send(WriterItem::Event((id, timestamp, frame)));
        }
        Dispatch::VideoFrame { frame, force_key_frame } => {
            let _ = video_tx.send(WriterItem::Event((frame, force_key_frame)));
        }
        Dispatch::Window(snapshot) => {
            let _ = window_tx.send(WriterItem::Event(snapshot));
        }
        Dispatch::Browser(event) => {
            let _ = browser_tx.send(WriterItem::Event(event));
        }
        Dispatch::Memory(stat) => {
            let _ = memory_tx.send(WriterItem::Event(stat));
        }
    }
}
