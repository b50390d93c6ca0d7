use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use captureflow_clock::Clock;
use captureflow_router::{CaptureEvent, InboxSender, RawWindowSnapshot};
use chrono::Utc;
use tracing::warn;
use xcap::Window;

use crate::error::{ReaderError, Result};

/// Polls the active (focused, topmost) window on a fixed cadence — 10Hz by
/// default, since window geometry changes far less often than input or
/// screen content.
pub struct WindowReader {
    poll_interval: Duration,
    clock: Clock,
}

impl WindowReader {
    pub fn new(poll_hz: f64, clock: Clock) -> Self {
        Self {
            poll_interval: Duration::from_secs_f64(1.0 / poll_hz.max(0.1)),
            clock,
        }
    }

    pub fn run(&self, inbox: InboxSender, terminate: Arc<AtomicBool>) -> Result<()> {
        while !terminate.load(Ordering::Relaxed) {
            let started = std::time::Instant::now();
            match active_window(&self.clock) {
                Ok(Some(snapshot)) => {
                    if inbox.send(CaptureEvent::Window(snapshot)).is_err() {
                        return Err(ReaderError::Disconnected);
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "window query failed, skipping sample"),
            }

            let elapsed = started.elapsed();
            if elapsed < self.poll_interval {
                std::thread::sleep(self.poll_interval - elapsed);
            }
        }
        Ok(())
    }
}

fn active_window(clock: &Clock) -> Result<Option<RawWindowSnapshot>> {
    let windows = Window::all().map_err(|e| ReaderError::WindowQuery(e.to_string()))?;
    let Some(window) = windows.into_iter().find(|w| !w.is_minimized()) else {
        return Ok(None);
    };

    let timestamp = match clock.now() {
        Ok(t) => t,
        Err(e) => {
            warn!(error = %e, "clock unavailable, skipping window sample");
            Utc::now()
        }
    };

    Ok(Some(RawWindowSnapshot {
        timestamp,
        title: window.title().to_string(),
        left: window.x() as i64,
        top: window.y() as i64,
        width: window.width() as i64,
        height: window.height() as i64,
        window_id: window.id().to_string(),
    }))
}
