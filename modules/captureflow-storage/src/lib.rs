#![warn(missing_docs)]
#![warn(clippy::all)]

//! Durable per-recording storage: the SQLite schema, inserts for every event
//! kind, and the post-processing pass that resolves action events' foreign keys.

mod config;
mod database;
mod error;
mod models;

pub use config::{RecordingConfig, StorageConfig};
pub use database::CaptureDatabase;
pub use error::{Result, StorageError};
pub use models::{
    ActionEvent, AudioInfo, BrowserEvent, MemoryStat, PerformanceStat, Recording, Screenshot,
    WindowEvent,
};

/// Crate version, surfaced for diagnostics.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
