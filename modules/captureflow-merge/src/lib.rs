#![warn(missing_docs)]
#![warn(clippy::all)]

//! Offline event-merging engine. Runs five ordered passes over a recording's
//! persisted, timestamp-sorted `action_events`, folding raw press/release/move
//! sequences into the coarser actions a human would describe: clicks, double
//! clicks, drags, and runs of typed text. Each pass disables the raw rows it
//! consumes and sets their `parent_id` to the new merged row, so the raw
//! history survives alongside the readable summary.
//!
//! Passes are idempotent: running them again over output that has already
//! been merged is a no-op, since every pass skips rows already `disabled`.

mod passes;

use captureflow_storage::{ActionEvent, RecordingConfig};

pub use passes::MergeOutcome;

/// Run every pass in order and return the augmented event list (raw events
/// plus newly-created merged events, in timestamp order) along with counts of
/// what each pass did.
pub fn merge_events(events: Vec<ActionEvent>, config: &RecordingConfig) -> MergeOutcome {
    let mut events = events;
    let mut outcome = MergeOutcome::default();

    passes::filter_invalid_keyboard(&mut events, &mut outcome);
    passes::merge_clicks(&mut events, config, &mut outcome);
    passes::detect_drags(&mut events, config, &mut outcome);
    passes::filter_redundant_moves(&mut events, &mut outcome);
    passes::merge_typed_text(&mut events, &mut outcome);

    events.sort_by_key(|e| e.timestamp);
    outcome.events = events;
    outcome
}
