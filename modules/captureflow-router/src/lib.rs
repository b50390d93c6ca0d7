#![warn(missing_docs)]
#![warn(clippy::all)]

//! The tagged event model, the single shared inbox every reader publishes
//! into, the action-gated router, and the per-kind writers that drain onto
//! storage.

mod error;
mod event;
mod inbox;
mod router;
mod writer;

pub use error::{Result, RouterError};
pub use event::{
    CaptureEvent, PersistedAction, RawActionEvent, RawBrowserEvent, RawMemoryStat,
    RawScreenFrame, RawWindowSnapshot, WriterItem,
};
pub use inbox::{inbox, InboxReceiver, InboxSender};
pub use router::{Dispatch, Router, RouterCounts};
pub use writer::{
    spawn_action_writer, spawn_browser_writer, spawn_memory_writer, spawn_screenshot_writer,
    spawn_window_writer, WriterReport, WRITER_JOIN_TIMEOUT,
};
