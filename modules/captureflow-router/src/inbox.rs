use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::event::CaptureEvent;

/// The single shared queue every reader pushes into. Unbounded: readers must
/// never block on a slow router, since blocking a reader means dropped input
/// or frames.
pub type InboxSender = Sender<CaptureEvent>;
pub type InboxReceiver = Receiver<CaptureEvent>;

/// Create a fresh inbox for one recording.
pub fn inbox() -> (InboxSender, InboxReceiver) {
    unbounded()
}
