use std::path::{Path, PathBuf};
use std::time::Duration;

use captureflow_router::RawScreenFrame;
use captureflow_storage::RecordingConfig;
use chrono::{DateTime, Utc};
use ndarray::Array3;
use tracing::{debug, info, warn};
use video_rs::encode::{Encoder, Settings};
use video_rs::ffmpeg::format::Pixel;
use video_rs::{Options, Time};

use crate::error::{Result, VideoError};
use crate::pts::compute_pts;

/// How long the host will wait for the encoder's dedicated finalize thread
/// before giving up and recording a `VideoPartial` outcome. Finalizing an
/// H.264 container involves a flush that has been observed to hang the
/// calling thread on some platforms, hence the generous budget and the
/// dedicated thread.
pub const FINALIZE_JOIN_TIMEOUT: Duration = Duration::from_secs(30);

struct LastFrame {
    frame: RawScreenFrame,
    pts: i64,
}

/// Wraps a `video-rs` H.264 encoder with the action-gated write policy: one
/// frame per dispatched [`RawScreenFrame`], a forced key frame on the very
/// first frame, and — on finalize — one extra duplicate write of the last
/// frame as a forced key frame before the container is flushed, matching the
/// "first frame is occasionally unplayable otherwise" workaround this encoder
/// was modeled on.
pub struct VideoEncoder {
    encoder: Encoder,
    path: PathBuf,
    fps: u32,
    video_start_timestamp: Option<DateTime<Utc>>,
    last: Option<LastFrame>,
    frames_written: u64,
}

impl VideoEncoder {
    /// Create `video.mp4` at `path` for a `width`x`height` recording at `fps`,
    /// encoded per `config`'s `VIDEO_ENCODING`/`VIDEO_PIXEL_FORMAT`/crf/preset
    /// (lossless archival by default: libx264, yuv444p, crf 0, veryslow).
    pub fn create(
        path: impl AsRef<Path>,
        width: u32,
        height: u32,
        fps: u32,
        config: &RecordingConfig,
    ) -> Result<Self> {
        let settings = build_settings(width, height, config);
        let encoder = Encoder::new(path.as_ref(), settings)?;

        Ok(Self {
            encoder,
            path: path.as_ref().to_path_buf(),
            fps,
            video_start_timestamp: None,
            last: None,
            frames_written: 0,
        })
    }

    /// The timestamp of the first frame ever written, i.e. `video_start_time`
    /// stored on the recording row. `None` until the first frame arrives.
    pub fn video_start_timestamp(&self) -> Option<DateTime<Utc>> {
        self.video_start_timestamp
    }

    /// Encode one gated frame. `force_key_frame` is set by the router for the
    /// very first action-gated frame of the recording.
    pub fn write_frame(&mut self, frame: RawScreenFrame, force_key_frame: bool) -> Result<()> {
        let video_start = *self.video_start_timestamp.get_or_insert(frame.timestamp);
        let last_pts = self.last.as_ref().map(|l| l.pts);
        let pts = compute_pts(frame.timestamp, video_start, self.fps, last_pts);
        let key_frame = force_key_frame || self.last.is_none();

        // The very first frame is written twice: the first write has occasionally
        // failed to land in the container on some platforms.
        let copies = if self.last.is_none() { 2 } else { 1 };
        for _ in 0..copies {
            self.encode_one(&frame, pts, key_frame)?;
        }

        self.last = Some(LastFrame { frame, pts });
        self.frames_written += 1;
        Ok(())
    }

    fn encode_one(&mut self, frame: &RawScreenFrame, pts: i64, key_frame: bool) -> Result<()> {
        let image = rgba_to_rgb_array(frame)?;
        let time = Time::from_nth_of_a_second(pts as usize, self.fps as usize);
        if key_frame {
            self.encoder.encode_with_keyframe(&image, time)?;
        } else {
            self.encoder.encode(&image, time)?;
        }
        Ok(())
    }

    /// Flush and close the container. Writes one final duplicate of the last
    /// frame, forced as a key frame, before flushing — mirrors the first-frame
    /// workaround applied symmetrically at the tail of the recording.
    pub fn finalize(mut self) -> Result<VideoSummary> {
        let Some(last) = self.last.take() else {
            warn!("finalizing video encoder with no frames ever written");
            return Err(VideoError::NotInitialized);
        };

        let pts = last.pts + 1;
        self.encode_one(&last.frame, pts, true)?;
        self.encoder.finish()?;

        info!(
            frames = self.frames_written,
            path = %self.path.display(),
            "video encoder finalized"
        );

        Ok(VideoSummary {
            frames_written: self.frames_written,
            video_start_timestamp: self.video_start_timestamp,
        })
    }
}

/// Summary returned once the encoder has been finalized.
#[derive(Debug, Clone)]
pub struct VideoSummary {
    pub frames_written: u64,
    pub video_start_timestamp: Option<DateTime<Utc>>,
}

/// Builds encoder settings from `config`. Only `libx264` is supported today;
/// an unrecognized `VIDEO_ENCODING` falls back to it with a warning, since
/// `video-rs`'s documented presets are all H.264.
fn build_settings(width: u32, height: u32, config: &RecordingConfig) -> Settings {
    if config.video_encoding != "libx264" {
        warn!(
            encoding = %config.video_encoding,
            "unsupported video encoding, falling back to libx264"
        );
    }

    let pixel_format = parse_pixel_format(&config.video_pixel_format);
    let mut ffmpeg_options = std::collections::HashMap::new();
    ffmpeg_options.insert("crf".to_string(), config.video_crf.to_string());
    ffmpeg_options.insert("preset".to_string(), config.video_preset.clone());
    let options = Options::from(ffmpeg_options);

    Settings::preset_h264_custom(width as usize, height as usize, pixel_format, options)
}

fn parse_pixel_format(format: &str) -> Pixel {
    match format {
        "yuv420p" => Pixel::YUV420P,
        "yuv444p" => Pixel::YUV444P,
        other => {
            warn!(pixel_format = other, "unrecognized pixel format, falling back to yuv444p");
            Pixel::YUV444P
        }
    }
}

fn rgba_to_rgb_array(frame: &RawScreenFrame) -> Result<Array3<u8>> {
    let (width, height) = (frame.width as usize, frame.height as usize);
    let mut rgb = Vec::with_capacity(width * height * 3);
    for chunk in frame.rgba.chunks_exact(4) {
        rgb.extend_from_slice(&chunk[..3]);
    }
    debug!(width, height, "converted captured frame to rgb24");
    Array3::from_shape_vec((height, width, 3), rgb)
        .map_err(|e| VideoError::FrameShape(format!("{width}x{height}: {e}")))
}
