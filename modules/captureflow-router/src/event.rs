use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Raw keyboard/mouse action as produced by the input reader, before the merge
/// engine folds runs of these into coarser actions.
#[derive(Debug, Clone)]
pub struct RawActionEvent {
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub mouse_x: Option<f64>,
    pub mouse_y: Option<f64>,
    pub mouse_dx: Option<f64>,
    pub mouse_dy: Option<f64>,
    pub mouse_button_name: Option<String>,
    pub mouse_pressed: Option<bool>,
    pub key_name: Option<String>,
    pub key_char: Option<String>,
    pub key_vk: Option<i64>,
    pub canonical_key_name: Option<String>,
    pub canonical_key_char: Option<String>,
    pub canonical_key_vk: Option<i64>,
}

/// A screen grab taken by the screen reader. Pixels are handed to the video
/// encoder directly; only the timestamp is persisted by the router.
#[derive(Debug, Clone)]
pub struct RawScreenFrame {
    pub timestamp: DateTime<Utc>,
    pub width: u32,
    pub height: u32,
    pub rgba: std::sync::Arc<[u8]>,
}

/// Active-window snapshot taken by the window reader.
#[derive(Debug, Clone)]
pub struct RawWindowSnapshot {
    pub timestamp: DateTime<Utc>,
    pub title: String,
    pub left: i64,
    pub top: i64,
    pub width: i64,
    pub height: i64,
    pub window_id: String,
}

/// Browser-relayed DOM event received over the optional WebSocket side channel.
#[derive(Debug, Clone)]
pub struct RawBrowserEvent {
    pub timestamp: DateTime<Utc>,
    pub json_data: serde_json::Value,
}

/// One host process memory sample.
#[derive(Debug, Clone)]
pub struct RawMemoryStat {
    pub timestamp: DateTime<Utc>,
    pub memory_usage_bytes: i64,
}

/// The tagged union every reader pushes into the shared inbox, and the router
/// matches on exhaustively. A fixed closed set, not a string-typed dynamic
/// dispatch, so an unhandled variant is a compile error rather than a silent
/// drop.
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    Action(RawActionEvent),
    Screen(RawScreenFrame),
    Window(RawWindowSnapshot),
    Browser(RawBrowserEvent),
    Memory(RawMemoryStat),
}

impl CaptureEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            CaptureEvent::Action(e) => e.timestamp,
            CaptureEvent::Screen(e) => e.timestamp,
            CaptureEvent::Window(e) => e.timestamp,
            CaptureEvent::Browser(e) => e.timestamp,
            CaptureEvent::Memory(e) => e.timestamp,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CaptureEvent::Action(_) => "action",
            CaptureEvent::Screen(_) => "screen",
            CaptureEvent::Window(_) => "window",
            CaptureEvent::Browser(_) => "browser",
            CaptureEvent::Memory(_) => "memory",
        }
    }
}

/// A persisted action event paired with the screenshot id the router chose to
/// pair it with, if any, and an id for downstream reference.
#[derive(Debug, Clone)]
pub struct PersistedAction {
    pub id: Uuid,
    pub event: RawActionEvent,
}

/// Message shape passed down every per-kind writer queue: either a real
/// payload or the [`Sentinel`] that tells the writer to flush and exit.
#[derive(Debug, Clone)]
pub enum WriterItem<T> {
    Event(T),
    Sentinel,
}

impl<T> WriterItem<T> {
    pub fn is_sentinel(&self) -> bool {
        matches!(self, WriterItem::Sentinel)
    }
}
