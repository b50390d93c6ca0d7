use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use captureflow_clock::Clock;
use captureflow_router::{CaptureEvent, InboxSender, RawMemoryStat};
use chrono::Utc;
use sysinfo::{Pid, System};
use tracing::warn;

use crate::error::{ReaderError, Result};

/// Samples this process's resident memory on a slow, fixed cadence — once a
/// second by default, since memory use doesn't need anywhere near the
/// resolution input or screen capture does.
pub struct MemoryReader {
    poll_interval: Duration,
    clock: Clock,
}

impl MemoryReader {
    pub fn new(poll_hz: f64, clock: Clock) -> Self {
        Self {
            poll_interval: Duration::from_secs_f64(1.0 / poll_hz.max(0.01)),
            clock,
        }
    }

    pub fn run(&self, inbox: InboxSender, terminate: Arc<AtomicBool>) -> Result<()> {
        let pid = Pid::from_u32(std::process::id());
        let mut system = System::new();

        while !terminate.load(Ordering::Relaxed) {
            system.refresh_process(pid);
            if let Some(process) = system.process(pid) {
                let timestamp = match self.clock.now() {
                    Ok(t) => t,
                    Err(e) => {
                        warn!(error = %e, "clock unavailable, skipping memory sample");
                        Utc::now()
                    }
                };
                let stat = RawMemoryStat {
                    timestamp,
                    memory_usage_bytes: process.memory() as i64,
                };
                if inbox.send(CaptureEvent::Memory(stat)).is_err() {
                    return Err(ReaderError::Disconnected);
                }
            }
            std::thread::sleep(self.poll_interval);
        }
        Ok(())
    }
}
