use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use captureflow_clock::Clock;
use captureflow_router::{CaptureEvent, InboxSender, RawScreenFrame};
use chrono::Utc;
use tracing::warn;
use xcap::Monitor;

use crate::error::{ReaderError, Result};

/// Polls the primary monitor on a fixed cadence and pushes each frame to the
/// inbox as a screen-tick candidate. The router only forwards a subset of
/// these (one per action) to the video encoder; polling faster than the
/// video's own frame rate keeps the gated frame close to the action that
/// triggered it.
pub struct ScreenReader {
    poll_interval: Duration,
    clock: Clock,
}

impl ScreenReader {
    pub fn new(poll_hz: f64, clock: Clock) -> Self {
        let poll_interval = Duration::from_secs_f64(1.0 / poll_hz.max(1.0));
        Self { poll_interval, clock }
    }

    /// Blocks the calling thread, capturing frames until `terminate` is set.
    /// Intended to run on a dedicated OS thread (screen capture APIs are
    /// typically not `Send`-friendly across an async runtime).
    pub fn run(&self, inbox: InboxSender, terminate: Arc<AtomicBool>) -> Result<()> {
        let monitor = primary_monitor()?;

        while !terminate.load(Ordering::Relaxed) {
            let started = std::time::Instant::now();
            match monitor.capture_image() {
                Ok(image) => {
                    let timestamp = match self.clock.now() {
                        Ok(t) => t,
                        Err(e) => {
                            warn!(error = %e, "clock unavailable, skipping screen frame");
                            Utc::now()
                        }
                    };
                    let frame = RawScreenFrame {
                        timestamp,
                        width: image.width(),
                        height: image.height(),
                        rgba: Arc::from(image.into_raw().into_boxed_slice()),
                    };
                    if inbox.send(CaptureEvent::Screen(frame)).is_err() {
                        return Err(ReaderError::Disconnected);
                    }
                }
                Err(e) => {
                    warn!(error = %e, "screen capture failed, skipping frame");
                }
            }

            let elapsed = started.elapsed();
            if elapsed < self.poll_interval {
                std::thread::sleep(self.poll_interval - elapsed);
            }
        }

        Ok(())
    }
}

fn primary_monitor() -> Result<Monitor> {
    let monitors = Monitor::all().map_err(|e| ReaderError::ScreenCapture(e.to_string()))?;
    monitors
        .into_iter()
        .find(|m| m.is_primary())
        .or_else(|| Monitor::all().ok().and_then(|m| m.into_iter().next()))
        .ok_or(ReaderError::NoMonitors)
}
