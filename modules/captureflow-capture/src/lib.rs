#![warn(missing_docs)]
#![warn(clippy::all)]

//! Read-only access to a finished recording, for tools built on top of
//! captureflow rather than the recorder itself: list merged actions, walk raw
//! events, or find which moment of `video.mp4` an action lines up with.

mod error;
mod session;

pub use error::{CaptureError, Result};
pub use session::{Action, CaptureSession};
