use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use captureflow_clock::Clock;
use captureflow_router::{CaptureEvent, InboxSender, RawActionEvent};
use chrono::Utc;
use rdev::{Button, Event, EventType, Key};
use tracing::{debug, info, warn};

use crate::error::{ReaderError, Result};

/// One or more ordered canonical-key-name sequences. Any sequence completing
/// in order — press its first key, then its second, with no other sequence
/// member out of place — ends the recording from within the captured session
/// itself, independent of the host process receiving a signal. Each
/// sequence's progress resets to zero on any key that doesn't continue it;
/// this is not a chord (the keys need not be held simultaneously).
#[derive(Debug, Clone)]
pub struct StopSequence {
    sequences: Vec<Vec<String>>,
}

impl StopSequence {
    pub fn new(sequences: Vec<Vec<String>>) -> Self {
        Self { sequences }
    }

    /// `ctrl, shift, esc` pressed in order, the default stop sequence.
    pub fn default_sequence() -> Self {
        Self::new(vec![vec!["ctrl".to_string(), "shift".to_string(), "esc".to_string()]])
    }

    fn progress_state(&self) -> Vec<usize> {
        vec![0; self.sequences.len()]
    }

    /// Advance every sequence's progress by one canonical key press. Returns
    /// `true` the instant any sequence reaches its full length.
    fn advance(&self, progress: &mut [usize], canonical_key_name: &str) -> bool {
        let mut matched = false;
        for (sequence, idx) in self.sequences.iter().zip(progress.iter_mut()) {
            if sequence.is_empty() {
                continue;
            }
            if sequence.get(*idx).map(String::as_str) == Some(canonical_key_name) {
                *idx += 1;
            } else {
                *idx = 0;
            }
            if *idx == sequence.len() {
                matched = true;
            }
        }
        matched
    }
}

/// Listens for global mouse and keyboard events via `rdev`, converts each
/// into a [`RawActionEvent`], and pushes it onto the shared inbox. Detects
/// [`StopSequence`] and flips `terminate` rather than relying solely on an
/// external signal.
pub struct InputReader {
    stop_sequence: StopSequence,
    clock: Clock,
}

impl InputReader {
    pub fn new(stop_sequence: StopSequence, clock: Clock) -> Self {
        Self { stop_sequence, clock }
    }

    /// Blocks the calling thread for the lifetime of the recording. Must be
    /// run on a dedicated OS thread — `rdev::listen` never returns control to
    /// its caller until the process exits or the callback panics.
    pub fn run(&self, inbox: InboxSender, terminate: Arc<AtomicBool>) -> Result<()> {
        let mut stop_progress = self.stop_sequence.progress_state();
        let stop_sequence = self.stop_sequence.clone();
        let clock = self.clock.clone();

        let callback = move |event: Event| {
            if terminate.load(Ordering::Relaxed) {
                return;
            }

            let timestamp = match clock.now() {
                Ok(t) => t,
                Err(e) => {
                    warn!(error = %e, "clock unavailable, skipping input event");
                    Utc::now()
                }
            };
            match event.event_type {
                EventType::KeyPress(key) => {
                    let canonical = canonical_name(key);
                    if stop_sequence.advance(&mut stop_progress, &canonical) {
                        info!("stop sequence detected, ending recording");
                        terminate.store(true, Ordering::Relaxed);
                        return;
                    }
                    let mut action = key_action(timestamp, key, &canonical, true);
                    action.key_char = event.name.clone();
                    send(&inbox, action);
                }
                EventType::KeyRelease(key) => {
                    let canonical = canonical_name(key);
                    let action = key_action(timestamp, key, &canonical, false);
                    send(&inbox, action);
                }
                EventType::ButtonPress(button) => {
                    send(&inbox, button_action(timestamp, button, true, None, None));
                }
                EventType::ButtonRelease(button) => {
                    send(&inbox, button_action(timestamp, button, false, None, None));
                }
                EventType::MouseMove { x, y } => {
                    send(&inbox, move_action(timestamp, x, y));
                }
                EventType::Wheel { delta_x, delta_y } => {
                    send(&inbox, scroll_action(timestamp, delta_x, delta_y));
                }
            }
        };

        rdev::listen(callback).map_err(ReaderError::InputHook)
    }
}

/// Collapse Left/Right key variants to the name a `STOP_SEQUENCES` entry
/// would use (`"ctrl"`, not `"ControlLeft"`), matching
/// `original_source/openadapt_capture/recorder.py`'s canonical key names.
fn canonical_name(key: Key) -> String {
    match key {
        Key::ControlLeft | Key::ControlRight => "ctrl".to_string(),
        Key::ShiftLeft | Key::ShiftRight => "shift".to_string(),
        Key::Alt | Key::AltGr => "alt".to_string(),
        Key::MetaLeft | Key::MetaRight => "meta".to_string(),
        Key::Escape => "esc".to_string(),
        Key::Return => "enter".to_string(),
        Key::Backspace => "backspace".to_string(),
        Key::Tab => "tab".to_string(),
        Key::Space => "space".to_string(),
        Key::KeyA => "a".to_string(),
        Key::KeyB => "b".to_string(),
        Key::KeyC => "c".to_string(),
        Key::KeyD => "d".to_string(),
        Key::KeyE => "e".to_string(),
        Key::KeyF => "f".to_string(),
        Key::KeyG => "g".to_string(),
        Key::KeyH => "h".to_string(),
        Key::KeyI => "i".to_string(),
        Key::KeyJ => "j".to_string(),
        Key::KeyK => "k".to_string(),
        Key::KeyL => "l".to_string(),
        Key::KeyM => "m".to_string(),
        Key::KeyN => "n".to_string(),
        Key::KeyO => "o".to_string(),
        Key::KeyP => "p".to_string(),
        Key::KeyQ => "q".to_string(),
        Key::KeyR => "r".to_string(),
        Key::KeyS => "s".to_string(),
        Key::KeyT => "t".to_string(),
        Key::KeyU => "u".to_string(),
        Key::KeyV => "v".to_string(),
        Key::KeyW => "w".to_string(),
        Key::KeyX => "x".to_string(),
        Key::KeyY => "y".to_string(),
        Key::KeyZ => "z".to_string(),
        Key::Num0 => "0".to_string(),
        Key::Num1 => "1".to_string(),
        Key::Num2 => "2".to_string(),
        Key::Num3 => "3".to_string(),
        Key::Num4 => "4".to_string(),
        Key::Num5 => "5".to_string(),
        Key::Num6 => "6".to_string(),
        Key::Num7 => "7".to_string(),
        Key::Num8 => "8".to_string(),
        Key::Num9 => "9".to_string(),
        Key::F1 => "f1".to_string(),
        Key::F2 => "f2".to_string(),
        Key::F3 => "f3".to_string(),
        Key::F4 => "f4".to_string(),
        Key::F5 => "f5".to_string(),
        Key::F6 => "f6".to_string(),
        Key::F7 => "f7".to_string(),
        Key::F8 => "f8".to_string(),
        Key::F9 => "f9".to_string(),
        Key::F10 => "f10".to_string(),
        Key::F11 => "f11".to_string(),
        Key::F12 => "f12".to_string(),
        other => format!("{:?}", other).to_ascii_lowercase(),
    }
}

fn send(inbox: &InboxSender, event: RawActionEvent) {
    if let Err(e) = inbox.send(CaptureEvent::Action(event)) {
        warn!(error = %e, "input reader could not publish to inbox");
    }
}

fn key_action(
    timestamp: chrono::DateTime<Utc>,
    key: Key,
    canonical: &str,
    pressed: bool,
) -> RawActionEvent {
    let name = if pressed { "key_press" } else { "key_release" };
    debug!(?key, pressed, "input event");
    RawActionEvent {
        timestamp,
        name: name.to_string(),
        mouse_x: None,
        mouse_y: None,
        mouse_dx: None,
        mouse_dy: None,
        mouse_button_name: None,
        mouse_pressed: None,
        key_name: Some(format!("{:?}", key)),
        key_char: None,
        key_vk: None,
        canonical_key_name: Some(canonical.to_string()),
        canonical_key_char: None,
        canonical_key_vk: None,
    }
}

fn button_action(
    timestamp: chrono::DateTime<Utc>,
    button: Button,
    pressed: bool,
    x: Option<f64>,
    y: Option<f64>,
) -> RawActionEvent {
    let name = if pressed { "mouse_press" } else { "mouse_release" };
    RawActionEvent {
        timestamp,
        name: name.to_string(),
        mouse_x: x,
        mouse_y: y,
        mouse_dx: None,
        mouse_dy: None,
        mouse_button_name: Some(format!("{:?}", button)),
        mouse_pressed: Some(pressed),
        key_name: None,
        key_char: None,
        key_vk: None,
        canonical_key_name: None,
        canonical_key_char: None,
        canonical_key_vk: None,
    }
}

fn move_action(timestamp: chrono::DateTime<Utc>, x: f64, y: f64) -> RawActionEvent {
    RawActionEvent {
        timestamp,
        name: "mouse_move".to_string(),
        mouse_x: Some(x),
        mouse_y: Some(y),
        mouse_dx: None,
        mouse_dy: None,
        mouse_button_name: None,
        mouse_pressed: None,
        key_name: None,
        key_char: None,
        key_vk: None,
        canonical_key_name: None,
        canonical_key_char: None,
        canonical_key_vk: None,
    }
}

fn scroll_action(timestamp: chrono::DateTime<Utc>, delta_x: i64, delta_y: i64) -> RawActionEvent {
    RawActionEvent {
        timestamp,
        name: "mouse_scroll".to_string(),
        mouse_x: None,
        mouse_y: None,
        mouse_dx: Some(delta_x as f64),
        mouse_dy: Some(delta_y as f64),
        mouse_button_name: None,
        mouse_pressed: None,
        key_name: None,
        key_char: None,
        key_vk: None,
        canonical_key_name: None,
        canonical_key_char: None,
        canonical_key_vk: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_sequence_matches_in_order_not_as_a_chord() {
        let sequence = StopSequence::default_sequence();
        let mut progress = sequence.progress_state();
        assert!(!sequence.advance(&mut progress, "ctrl"));
        assert!(!sequence.advance(&mut progress, "shift"));
        assert!(sequence.advance(&mut progress, "esc"));
    }

    #[test]
    fn out_of_order_presses_reset_progress() {
        let sequence = StopSequence::default_sequence();
        let mut progress = sequence.progress_state();
        assert!(!sequence.advance(&mut progress, "ctrl"));
        assert!(!sequence.advance(&mut progress, "esc")); // wrong order, resets
        assert!(!sequence.advance(&mut progress, "shift"));
        assert!(!sequence.advance(&mut progress, "esc"));
        // sequence never completes because the reset lost the leading "ctrl"
        assert!(!sequence.advance(&mut progress, "shift"));
    }

    #[test]
    fn intervening_key_resets_the_sequence() {
        let sequence = StopSequence::default_sequence();
        let mut progress = sequence.progress_state();
        assert!(!sequence.advance(&mut progress, "ctrl"));
        assert!(!sequence.advance(&mut progress, "a")); // unrelated key, resets
        assert!(!sequence.advance(&mut progress, "shift"));
        assert!(!sequence.advance(&mut progress, "esc"));
        assert!(!sequence.advance(&mut progress, "ctrl"));
        assert!(!sequence.advance(&mut progress, "shift"));
        assert!(sequence.advance(&mut progress, "esc"));
    }

    #[test]
    fn triple_press_sequence_matches() {
        let sequence = StopSequence::new(vec![vec!["ctrl".into(), "ctrl".into(), "ctrl".into()]]);
        let mut progress = sequence.progress_state();
        assert!(!sequence.advance(&mut progress, "ctrl"));
        assert!(!sequence.advance(&mut progress, "ctrl"));
        assert!(sequence.advance(&mut progress, "ctrl"));
    }

    #[test]
    fn canonical_name_collapses_left_right_variants() {
        assert_eq!(canonical_name(Key::ControlLeft), "ctrl");
        assert_eq!(canonical_name(Key::ControlRight), "ctrl");
        assert_eq!(canonical_name(Key::ShiftLeft), "shift");
        assert_eq!(canonical_name(Key::Escape), "esc");
        assert_eq!(canonical_name(Key::KeyH), "h");
    }
}
