use serde::{Deserialize, Serialize};

/// Immutable snapshot of recording-time settings, captured once when a recording
/// opens and stored verbatim as `Recording.config`. Passed explicitly to every
/// component instead of read from a global — see the REDESIGN notes in
/// `DESIGN.md`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordingConfig {
    #[serde(default = "default_video_fps")]
    pub video_fps: u32,

    #[serde(default = "default_double_click_distance")]
    pub double_click_distance_threshold: f64,

    #[serde(default = "default_double_click_interval")]
    pub double_click_interval_threshold: f64,

    #[serde(default = "default_drag_threshold")]
    pub drag_distance_threshold: f64,

    #[serde(default)]
    pub plot_performance: bool,

    #[serde(default)]
    pub record_browser_events: bool,

    #[serde(default = "default_window_poll_hz")]
    pub window_poll_hz: f64,

    /// Whether the encoder worker runs at all for this recording.
    #[serde(default = "default_true")]
    pub record_video: bool,

    /// Encode every screen tick rather than only the tick nearest each action.
    #[serde(default)]
    pub record_full_video: bool,

    /// Persist a PNG blob alongside each screenshot row.
    #[serde(default)]
    pub record_images: bool,

    /// Capture a narration track alongside input/screen/window.
    #[serde(default)]
    pub record_audio: bool,

    #[serde(default = "default_true")]
    pub record_window_data: bool,

    #[serde(default = "default_video_encoding")]
    pub video_encoding: String,

    #[serde(default = "default_video_pixel_format")]
    pub video_pixel_format: String,

    #[serde(default = "default_video_crf")]
    pub video_crf: u32,

    #[serde(default = "default_video_preset")]
    pub video_preset: String,

    /// Ordered canonical-key-name sequences; any one of them completing in
    /// order ends the recording from within the captured session. Empty
    /// falls back to the built-in `ctrl, shift, esc` sequence.
    #[serde(default)]
    pub stop_sequences: Vec<Vec<String>>,

    #[serde(default = "default_browser_websocket_ip")]
    pub browser_websocket_server_ip: String,

    #[serde(default = "default_browser_websocket_port")]
    pub browser_websocket_port: u16,

    #[serde(default = "default_browser_websocket_max_size")]
    pub browser_websocket_max_size: usize,

    /// Sample rate, in Hz, for the audio capture device.
    #[serde(default = "default_audio_sample_rate")]
    pub audio_sample_rate: u32,

    #[serde(default)]
    pub log_memory: bool,
}

fn default_true() -> bool {
    true
}

fn default_video_fps() -> u32 {
    15
}

fn default_double_click_distance() -> f64 {
    5.0
}

fn default_double_click_interval() -> f64 {
    0.3
}

fn default_drag_threshold() -> f64 {
    5.0
}

fn default_window_poll_hz() -> f64 {
    10.0
}

fn default_video_encoding() -> String {
    "libx264".to_string()
}

fn default_video_pixel_format() -> String {
    "yuv444p".to_string()
}

fn default_video_crf() -> u32 {
    0
}

fn default_video_preset() -> String {
    "veryslow".to_string()
}

fn default_browser_websocket_ip() -> String {
    "127.0.0.1".to_string()
}

fn default_browser_websocket_port() -> u16 {
    8765
}

fn default_browser_websocket_max_size() -> usize {
    10 * 1024 * 1024
}

fn default_audio_sample_rate() -> u32 {
    16_000
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            video_fps: default_video_fps(),
            double_click_distance_threshold: default_double_click_distance(),
            double_click_interval_threshold: default_double_click_interval(),
            drag_distance_threshold: default_drag_threshold(),
            plot_performance: false,
            record_browser_events: false,
            window_poll_hz: default_window_poll_hz(),
            record_video: true,
            record_full_video: false,
            record_images: false,
            record_audio: false,
            record_window_data: true,
            video_encoding: default_video_encoding(),
            video_pixel_format: default_video_pixel_format(),
            video_crf: default_video_crf(),
            video_preset: default_video_preset(),
            stop_sequences: Vec::new(),
            browser_websocket_server_ip: default_browser_websocket_ip(),
            browser_websocket_port: default_browser_websocket_port(),
            browser_websocket_max_size: default_browser_websocket_max_size(),
            audio_sample_rate: default_audio_sample_rate(),
            log_memory: false,
        }
    }
}

/// Top-level storage configuration, layered from defaults, an optional config
/// file, and `CAPTUREFLOW_`-prefixed environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_capture_root")]
    pub capture_root: String,

    #[serde(default)]
    pub recording: RecordingConfig,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_capture_root() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("captureflow").to_string_lossy().into_owned())
        .unwrap_or_else(|| "./captures".to_string())
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_max_connections() -> u32 {
    4
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            capture_root: default_capture_root(),
            recording: RecordingConfig::default(),
            busy_timeout_ms: default_busy_timeout_ms(),
            max_connections: default_max_connections(),
        }
    }
}

impl StorageConfig {
    /// Load configuration from an optional file, layered over defaults and
    /// `CAPTUREFLOW_`-prefixed environment overrides.
    pub fn load(config_path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&StorageConfig::default())?);

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("CAPTUREFLOW")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_recording_config_matches_known_thresholds() {
        let config = RecordingConfig::default();
        assert_eq!(config.video_fps, 15);
        assert_eq!(config.double_click_distance_threshold, 5.0);
    }

    #[test]
    fn default_recording_config_is_lossless_archival() {
        let config = RecordingConfig::default();
        assert!(config.record_video);
        assert!(!config.record_full_video);
        assert!(!config.record_images);
        assert!(!config.record_audio);
        assert!(config.record_window_data);
        assert_eq!(config.video_encoding, "libx264");
        assert_eq!(config.video_pixel_format, "yuv444p");
        assert_eq!(config.video_crf, 0);
        assert_eq!(config.video_preset, "veryslow");
        assert!(config.stop_sequences.is_empty());
    }

    #[test]
    fn load_with_no_file_falls_back_to_defaults() {
        let config = StorageConfig::load(None).unwrap();
        assert_eq!(config.busy_timeout_ms, 5_000);
    }
}
