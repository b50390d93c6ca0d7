//! Process-wide monotonic clock anchored to a recording's wall-clock start.
//!
//! `now()` returns `wall_start + (perf_counter_now - perf_counter_start)`: wall-clock
//! time is needed for cross-process alignment (audio, OS timestamps) and to name
//! outputs, while the monotonic delta keeps `now()` non-decreasing even if the
//! system clock is adjusted mid-recording.
//!
//! Unlike the source this was distilled from, there is no process-global mutable
//! clock here — a [`Clock`] is an explicit value constructed once per recording and
//! passed into every reader, the router, and the writers.

use std::sync::Mutex;
use std::time::Instant;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised by [`Clock`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockError {
    /// `now()` was called before [`Clock::anchor`] established the recording's start.
    #[error("clock queried before it was anchored to a recording start")]
    Uninitialized,

    /// `anchor()` was called a second time on an already-anchored clock.
    #[error("clock was already anchored")]
    AlreadyAnchored,
}

/// Result type for clock operations.
pub type Result<T> = std::result::Result<T, ClockError>;

struct Anchor {
    wall_start: DateTime<Utc>,
    perf_start: Instant,
}

/// A process-wide monotonic clock anchored to a single recording's start.
///
/// Cheaply cloneable; all clones share the same anchor.
#[derive(Clone)]
pub struct Clock {
    anchor: std::sync::Arc<Mutex<Option<Anchor>>>,
}

impl Clock {
    /// Create an unanchored clock. Must be anchored with [`Clock::anchor`] before
    /// [`Clock::now`] will succeed.
    pub fn new() -> Self {
        Self {
            anchor: std::sync::Arc::new(Mutex::new(None)),
        }
    }

    /// Anchor the clock to the current instant, establishing `wall_start` and
    /// `perf_counter_start` for the recording. Idempotent calls after the first
    /// return [`ClockError::AlreadyAnchored`].
    pub fn anchor(&self) -> Result<DateTime<Utc>> {
        let mut guard = self.anchor.lock().expect("clock mutex poisoned");
        if guard.is_some() {
            return Err(ClockError::AlreadyAnchored);
        }
        let wall_start = Utc::now();
        *guard = Some(Anchor {
            wall_start,
            perf_start: Instant::now(),
        });
        Ok(wall_start)
    }

    /// The wall-clock instant the recording started, i.e. `Recording.timestamp`.
    pub fn wall_start(&self) -> Result<DateTime<Utc>> {
        let guard = self.anchor.lock().expect("clock mutex poisoned");
        guard
            .as_ref()
            .map(|a| a.wall_start)
            .ok_or(ClockError::Uninitialized)
    }

    /// Current time: `wall_start + (perf_counter_now - perf_counter_start)`.
    ///
    /// Strictly non-decreasing within a process, since it derives entirely from
    /// [`Instant`], which the standard library guarantees is monotonic.
    pub fn now(&self) -> Result<DateTime<Utc>> {
        let guard = self.anchor.lock().expect("clock mutex poisoned");
        let anchor = guard.as_ref().ok_or(ClockError::Uninitialized)?;
        let elapsed = anchor.perf_start.elapsed();
        let delta = chrono::Duration::from_std(elapsed).unwrap_or(chrono::Duration::zero());
        Ok(anchor.wall_start + delta)
    }

    /// Convert a wall-clock timestamp taken from this clock into seconds elapsed
    /// since the anchor, the unit every persisted timestamp in the schema uses.
    pub fn seconds_since_start(&self, at: DateTime<Utc>) -> Result<f64> {
        let start = self.wall_start()?;
        Ok((at - start).num_nanoseconds().unwrap_or(0) as f64 / 1_000_000_000.0)
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_before_anchor_is_uninitialized() {
        let clock = Clock::new();
        assert_eq!(clock.now().unwrap_err(), ClockError::Uninitialized);
    }

    #[test]
    fn anchor_twice_fails() {
        let clock = Clock::new();
        clock.anchor().unwrap();
        assert_eq!(clock.anchor().unwrap_err(), ClockError::AlreadyAnchored);
    }

    #[test]
    fn now_is_non_decreasing() {
        let clock = Clock::new();
        clock.anchor().unwrap();

        let mut prev = clock.now().unwrap();
        for _ in 0..100 {
            let next = clock.now().unwrap();
            assert!(next >= prev);
            prev = next;
        }
    }

    #[test]
    fn clones_share_the_same_anchor() {
        let clock = Clock::new();
        let wall_start = clock.anchor().unwrap();

        let clone = clock.clone();
        assert_eq!(clone.wall_start().unwrap(), wall_start);
    }

    #[test]
    fn seconds_since_start_grows() {
        let clock = Clock::new();
        clock.anchor().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let now = clock.now().unwrap();
        let secs = clock.seconds_since_start(now).unwrap();
        assert!(secs >= 0.0);
    }
}
