#![warn(missing_docs)]
#![warn(clippy::all)]

//! Input, screen, and window readers: the producer side of the capture
//! pipeline. Each reader runs on its own dedicated OS thread and publishes
//! into the shared inbox; none of them ever block waiting on the router.

mod audio;
mod error;
mod input;
mod memory;
mod screen;
mod window;

pub use audio::{AudioCapture, AudioReader};
pub use error::{ReaderError, Result};
pub use input::{InputReader, StopSequence};
pub use memory::MemoryReader;
pub use screen::ScreenReader;
pub use window::WindowReader;
