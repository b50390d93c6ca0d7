#![warn(missing_docs)]
#![warn(clippy::all)]

//! Action-gated H.264 video encoding: one frame per dispatched action, with
//! presentation-timestamp bookkeeping, forced key frames, and a finalize
//! step that runs on its own thread.

mod encoder;
mod error;
mod pts;

pub use encoder::{VideoEncoder, VideoSummary, FINALIZE_JOIN_TIMEOUT};
pub use error::{Result, VideoError};
pub use pts::compute_pts;
