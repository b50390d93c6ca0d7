use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use captureflow_clock::Clock;
use chrono::{DateTime, Utc};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use tracing::warn;

use crate::error::{ReaderError, Result};

/// A finished audio capture: mono 16-bit PCM samples at a fixed sample rate,
/// along with the wall-clock time recording started.
pub struct AudioCapture {
    /// When the stream started producing samples.
    pub started_at: DateTime<Utc>,
    /// Sample rate the device actually opened at (may not match the
    /// requested rate; the device's native rate always wins).
    pub sample_rate: u32,
    /// Captured samples, already downmixed to mono.
    pub samples: Vec<i16>,
}

/// Captures microphone audio on the default input device for the lifetime of
/// a recording. Runs the `cpal` stream on its own thread and blocks until
/// `terminate` is set, mirroring the other readers' run-until-stopped shape.
pub struct AudioReader {
    requested_sample_rate: u32,
    clock: Clock,
}

impl AudioReader {
    pub fn new(requested_sample_rate: u32, clock: Clock) -> Self {
        Self {
            requested_sample_rate,
            clock,
        }
    }

    /// Blocks until `terminate` is set, then stops the stream and returns
    /// everything captured.
    pub fn run(&self, terminate: Arc<AtomicBool>) -> Result<AudioCapture> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(ReaderError::NoAudioDevice)?;

        let supported = device
            .default_input_config()
            .map_err(|e| ReaderError::AudioDevice(e.to_string()))?;
        let sample_format = supported.sample_format();
        let channels = supported.channels();
        let config: StreamConfig = supported.into();
        let sample_rate = config.sample_rate.0;
        if sample_rate != self.requested_sample_rate {
            warn!(
                requested = self.requested_sample_rate,
                actual = sample_rate,
                "audio device does not support requested sample rate, using device default"
            );
        }

        let started_at = match self.clock.now() {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "clock unavailable, stamping audio capture start with wall clock");
                Utc::now()
            }
        };

        let samples = Arc::new(Mutex::new(Vec::<i16>::new()));
        let err_fn = |e: cpal::StreamError| warn!(error = %e, "audio stream error");

        let stream = match sample_format {
            SampleFormat::I16 => build_stream::<i16>(&device, &config, channels, samples.clone(), err_fn),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, channels, samples.clone(), err_fn),
            SampleFormat::F32 => build_stream::<f32>(&device, &config, channels, samples.clone(), err_fn),
            other => return Err(ReaderError::AudioDevice(format!("unsupported sample format: {other:?}"))),
        }?;

        stream.play().map_err(|e| ReaderError::AudioStream(e.to_string()))?;

        while !terminate.load(Ordering::Relaxed) {
            std::thread::sleep(Duration::from_millis(50));
        }

        stream.pause().map_err(|e| ReaderError::AudioStream(e.to_string()))?;
        drop(stream);

        let samples = samples.lock().map_err(|_| ReaderError::AudioStream("sample buffer poisoned".into()))?;
        Ok(AudioCapture {
            started_at,
            sample_rate,
            samples: samples.clone(),
        })
    }
}

/// Downmixes an interleaved, possibly-multichannel callback buffer to mono
/// `i16` and appends it to the shared sample buffer.
fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    channels: u16,
    samples: Arc<Mutex<Vec<i16>>>,
    err_fn: impl Fn(cpal::StreamError) + Send + 'static,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + Into<f32>,
{
    let channels = channels.max(1) as usize;
    let data_callback = move |data: &[T], _: &cpal::InputCallbackInfo| {
        let Ok(mut samples) = samples.lock() else {
            return;
        };
        for frame in data.chunks(channels) {
            let mixed: f32 = frame.iter().map(|&s| s.into()).sum::<f32>() / channels as f32;
            samples.push((mixed.clamp(-1.0, 1.0) * i16::MAX as f32) as i16);
        }
    };
    device
        .build_input_stream(config, data_callback, err_fn, None)
        .map_err(|e| ReaderError::AudioStream(e.to_string()))
}
