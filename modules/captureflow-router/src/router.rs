use captureflow_storage::RecordingConfig;
use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::event::{
    CaptureEvent, PersistedAction, RawBrowserEvent, RawMemoryStat, RawScreenFrame,
    RawWindowSnapshot,
};

/// One unit of outbound work the router decided to hand to a writer or the
/// video encoder after processing an inbox event.
#[derive(Debug, Clone)]
pub enum Dispatch {
    Action(PersistedAction),
    /// Record that a video frame was taken at `timestamp`, so the post-process
    /// pass can later match it to the action it was gated by. Carries the raw
    /// frame only when `RECORD_IMAGES` is on, so the screenshot writer can
    /// PNG-encode it into `png_data`.
    Screenshot {
        id: Uuid,
        timestamp: DateTime<Utc>,
        frame: Option<RawScreenFrame>,
    },
    VideoFrame {
        frame: RawScreenFrame,
        force_key_frame: bool,
    },
    Window(RawWindowSnapshot),
    Browser(RawBrowserEvent),
    Memory(RawMemoryStat),
}

/// Counts of events seen, surfaced in the end-of-recording summary.
#[derive(Debug, Default, Clone, Copy)]
pub struct RouterCounts {
    pub actions_seen: u64,
    pub actions_dropped: u64,
    pub screens_seen: u64,
    pub windows_seen: u64,
    pub browser_events: u64,
    pub memory_samples: u64,
}

/// The single-threaded event router: consumes the shared inbox and decides,
/// for each action, whether a new video frame and window row need to be
/// gated in alongside it. Screen ticks and window polls are buffered as
/// "candidates" and only actually written when an action arrives that hasn't
/// already consumed the latest candidate — one video frame per action, not
/// per screen tick.
pub struct Router {
    prev_screen: Option<RawScreenFrame>,
    prev_window: Option<RawWindowSnapshot>,
    prev_saved_screen_ts: Option<DateTime<Utc>>,
    prev_saved_window_ts: Option<DateTime<Utc>>,

    last_action_ts: Option<DateTime<Utc>>,
    last_screen_ts: Option<DateTime<Utc>>,
    last_window_ts: Option<DateTime<Utc>>,

    record_video: bool,
    record_full_video: bool,
    record_images: bool,
    record_window_data: bool,

    counts: RouterCounts,
}

impl Router {
    pub fn new(config: &RecordingConfig) -> Self {
        Self {
            prev_screen: None,
            prev_window: None,
            prev_saved_screen_ts: None,
            prev_saved_window_ts: None,
            last_action_ts: None,
            last_screen_ts: None,
            last_window_ts: None,
            record_video: config.record_video,
            record_full_video: config.record_full_video,
            record_images: config.record_images,
            record_window_data: config.record_window_data,
            counts: RouterCounts::default(),
        }
    }

    pub fn counts(&self) -> RouterCounts {
        self.counts
    }

    /// Process one inbox event, returning zero or more dispatches for the
    /// host to route to the right writer/encoder queue.
    pub fn route(&mut self, event: CaptureEvent) -> Vec<Dispatch> {
        match event {
            CaptureEvent::Screen(frame) => {
                if !self.record_video {
                    return vec![];
                }
                if !monotonic(&mut self.last_screen_ts, frame.timestamp, "screen") {
                    return vec![];
                }
                self.counts.screens_seen += 1;

                if self.record_full_video {
                    let force_key_frame = self.prev_saved_screen_ts.is_none();
                    self.prev_saved_screen_ts = Some(frame.timestamp);
                    return vec![Dispatch::VideoFrame { frame, force_key_frame }];
                }

                self.prev_screen = Some(frame);
                vec![]
            }
            CaptureEvent::Window(snapshot) => {
                if !self.record_window_data {
                    return vec![];
                }
                if !monotonic(&mut self.last_window_ts, snapshot.timestamp, "window") {
                    return vec![];
                }
                self.counts.windows_seen += 1;
                self.prev_window = Some(snapshot);
                vec![]
            }
            CaptureEvent::Browser(event) => {
                self.counts.browser_events += 1;
                vec![Dispatch::Browser(event)]
            }
            CaptureEvent::Memory(stat) => {
                self.counts.memory_samples += 1;
                vec![Dispatch::Memory(stat)]
            }
            CaptureEvent::Action(action) => {
                if !monotonic(&mut self.last_action_ts, action.timestamp, "action") {
                    return vec![];
                }
                self.counts.actions_seen += 1;

                let mut dispatches = Vec::with_capacity(3);

                if self.record_video && !self.record_full_video {
                    let Some(screen) = self.prev_screen.clone() else {
                        warn!("discarding action that came before the first screen frame");
                        self.counts.actions_dropped += 1;
                        return vec![];
                    };

                    let force_key_frame = self.prev_saved_screen_ts.is_none();
                    let screen_needs_saving = self
                        .prev_saved_screen_ts
                        .map_or(true, |saved| screen.timestamp > saved);
                    if screen_needs_saving {
                        let screenshot_frame = if self.record_images {
                            Some(screen.clone())
                        } else {
                            None
                        };
                        dispatches.push(Dispatch::Screenshot {
                            id: Uuid::new_v4(),
                            timestamp: screen.timestamp,
                            frame: screenshot_frame,
                        });
                        self.prev_saved_screen_ts = Some(screen.timestamp);
                        dispatches.push(Dispatch::VideoFrame {
                            frame: screen,
                            force_key_frame,
                        });
                    }
                }

                if self.record_window_data {
                    match &self.prev_window {
                        None => warn!("discarding window pairing: no window event seen yet"),
                        Some(window) => {
                            let window_needs_saving = self
                                .prev_saved_window_ts
                                .map_or(true, |saved| window.timestamp > saved);
                            if window_needs_saving {
                                self.prev_saved_window_ts = Some(window.timestamp);
                                dispatches.push(Dispatch::Window(window.clone()));
                            }
                        }
                    }
                }

                dispatches.push(Dispatch::Action(PersistedAction {
                    id: Uuid::new_v4(),
                    event: action,
                }));

                dispatches
            }
        }
    }
}

/// Update `last` to `ts` if `ts` is strictly newer, returning `false` (and
/// logging) if `ts` would move time backwards — the event is swallowed rather
/// than propagated.
fn monotonic(last: &mut Option<DateTime<Utc>>, ts: DateTime<Utc>, kind: &str) -> bool {
    if let Some(prev) = *last {
        if ts < prev {
            warn!(kind, "swallowing out-of-order event: {} < {}", ts, prev);
            return false;
        }
    }
    *last = Some(ts);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::RawActionEvent;

    fn screen_at(ts: DateTime<Utc>) -> CaptureEvent {
        CaptureEvent::Screen(RawScreenFrame {
            timestamp: ts,
            width: 10,
            height: 10,
            rgba: std::sync::Arc::from(vec![0u8; 400].into_boxed_slice()),
        })
    }

    fn window_at(ts: DateTime<Utc>) -> CaptureEvent {
        CaptureEvent::Window(RawWindowSnapshot {
            timestamp: ts,
            title: "editor".into(),
            left: 0,
            top: 0,
            width: 800,
            height: 600,
            window_id: "1".into(),
        })
    }

    fn action_at(ts: DateTime<Utc>) -> CaptureEvent {
        CaptureEvent::Action(RawActionEvent {
            timestamp: ts,
            name: "click".into(),
            mouse_x: Some(1.0),
            mouse_y: Some(1.0),
            mouse_dx: None,
            mouse_dy: None,
            mouse_button_name: Some("left".into()),
            mouse_pressed: Some(true),
            key_name: None,
            key_char: None,
            key_vk: None,
            canonical_key_name: None,
            canonical_key_char: None,
            canonical_key_vk: None,
        })
    }

    #[test]
    fn action_before_any_screen_is_dropped() {
        let mut router = Router::new(&RecordingConfig::default());
        let t0 = Utc::now();
        let dispatches = router.route(action_at(t0));
        assert!(dispatches.is_empty());
        assert_eq!(router.counts().actions_dropped, 1);
    }

    #[test]
    fn one_action_gates_exactly_one_video_frame() {
        let mut router = Router::new(&RecordingConfig::default());
        let t0 = Utc::now();
        router.route(screen_at(t0));
        router.route(window_at(t0));

        let dispatches = router.route(action_at(t0 + chrono::Duration::milliseconds(10)));
        let frames = dispatches
            .iter()
            .filter(|d| matches!(d, Dispatch::VideoFrame { .. }))
            .count();
        assert_eq!(frames, 1);
        let actions = dispatches
            .iter()
            .filter(|d| matches!(d, Dispatch::Action(_)))
            .count();
        assert_eq!(actions, 1);
    }

    #[test]
    fn two_actions_against_one_unchanged_screen_tick_gate_one_frame_total() {
        let mut router = Router::new(&RecordingConfig::default());
        let t0 = Utc::now();
        router.route(screen_at(t0));
        router.route(window_at(t0));

        let first = router.route(action_at(t0 + chrono::Duration::milliseconds(10)));
        let second = router.route(action_at(t0 + chrono::Duration::milliseconds(20)));

        assert_eq!(
            first
                .iter()
                .filter(|d| matches!(d, Dispatch::VideoFrame { .. }))
                .count(),
            1
        );
        assert_eq!(
            second
                .iter()
                .filter(|d| matches!(d, Dispatch::VideoFrame { .. }))
                .count(),
            0,
            "screen candidate was already consumed by the first action"
        );
    }

    #[test]
    fn out_of_order_action_is_swallowed() {
        let mut router = Router::new(&RecordingConfig::default());
        let t0 = Utc::now();
        router.route(screen_at(t0));
        router.route(action_at(t0 + chrono::Duration::milliseconds(10)));

        let dispatches = router.route(action_at(t0));
        assert!(dispatches.is_empty());
    }

    #[test]
    fn first_gated_frame_is_forced_key_frame() {
        let mut router = Router::new(&RecordingConfig::default());
        let t0 = Utc::now();
        router.route(screen_at(t0));
        let dispatches = router.route(action_at(t0 + chrono::Duration::milliseconds(10)));
        let force_key_frame = dispatches.iter().find_map(|d| match d {
            Dispatch::VideoFrame { force_key_frame, .. } => Some(*force_key_frame),
            _ => None,
        });
        assert_eq!(force_key_frame, Some(true));
    }
}
