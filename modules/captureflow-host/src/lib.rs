#![warn(missing_docs)]
#![warn(clippy::all)]

//! Process wiring for one recording: spawns the readers, router, writers,
//! and video encoder, waits for the recording to end, and joins everything
//! down with per-component timeouts.

mod error;
mod host;
mod join;
mod outcome;

pub use error::{HostError, Result};
pub use host::{record, RecordRequest};
pub use outcome::RecordingOutcome;
