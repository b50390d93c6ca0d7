use std::collections::HashMap;

use captureflow_storage::{ActionEvent, RecordingConfig};
use uuid::Uuid;

/// Result of running all five merge passes: the augmented event list plus a
/// count of what each pass did, useful for logging and tests.
#[derive(Debug, Default)]
pub struct MergeOutcome {
    pub events: Vec<ActionEvent>,
    pub invalid_keyboard_dropped: usize,
    pub redundant_moves_dropped: usize,
    pub clicks_merged: usize,
    pub double_clicks_merged: usize,
    pub drags_merged: usize,
    pub typed_runs_merged: usize,
}

fn active(events: &[ActionEvent]) -> impl Iterator<Item = (usize, &ActionEvent)> {
    events.iter().enumerate().filter(|(_, e)| !e.disabled)
}

/// Pass 1: drop keyboard releases with no matching press (can happen when a
/// key was already held down when the recording started) and collapse
/// auto-repeat presses (a held key firing repeated `key_press` events with no
/// intervening release) down to the first press.
pub fn filter_invalid_keyboard(events: &mut [ActionEvent], outcome: &mut MergeOutcome) {
    let mut held: HashMap<String, bool> = HashMap::new();
    let mut to_disable = Vec::new();

    for (idx, event) in events.iter().enumerate() {
        if event.disabled || !event.is_keyboard() {
            continue;
        }
        let Some(key) = event.key_name.clone() else {
            continue;
        };

        match event.name.as_str() {
            "key_press" => {
                if *held.get(&key).unwrap_or(&false) {
                    to_disable.push(idx); // auto-repeat
                } else {
                    held.insert(key, true);
                }
            }
            "key_release" => {
                if *held.get(&key).unwrap_or(&false) {
                    held.insert(key, false);
                } else {
                    to_disable.push(idx); // release with no matching press
                }
            }
            _ => {}
        }
    }

    for idx in to_disable {
        events[idx].disabled = true;
        outcome.invalid_keyboard_dropped += 1;
    }
}

/// Pass 2: within a run of consecutive `mouse_move` events, keep only the
/// last one — the rest are redundant for reconstructing where the pointer
/// ended up before the next non-move action.
pub fn filter_redundant_moves(events: &mut [ActionEvent], outcome: &mut MergeOutcome) {
    let indices: Vec<usize> = active(events)
        .filter(|(_, e)| e.name == "mouse_move")
        .map(|(i, _)| i)
        .collect();

    for window in indices.windows(2) {
        let (first, second) = (window[0], window[1]);
        if second == first + 1 || is_next_active_move(events, first, second) {
            events[first].disabled = true;
            outcome.redundant_moves_dropped += 1;
        }
    }
}

fn is_next_active_move(events: &[ActionEvent], first: usize, second: usize) -> bool {
    !(first + 1..second).any(|i| !events[i].disabled)
}

/// Pass 3: fold a `mouse_press` + `mouse_release` pair with little-to-no
/// pointer movement between them into a single `click` event. Two clicks of
/// the same button within `double_click_distance_threshold` and
/// `double_click_interval_threshold` are then folded into `doubleclick`.
pub fn merge_clicks(events: &mut Vec<ActionEvent>, config: &RecordingConfig, outcome: &mut MergeOutcome) {
    let mut clicks: Vec<ActionEvent> = Vec::new();
    let mut consumed: Vec<(usize, usize)> = Vec::new();

    let presses: Vec<usize> = active(events)
        .filter(|(_, e)| e.name == "mouse_press")
        .map(|(i, _)| i)
        .collect();

    for &press_idx in &presses {
        let press = events[press_idx].clone();
        let Some(release_idx) = active(events)
            .skip_while(|(i, _)| *i <= press_idx)
            .find(|(_, e)| {
                e.name == "mouse_release" && e.mouse_button_name == press.mouse_button_name
            })
            .map(|(i, _)| i)
        else {
            continue;
        };
        let release = events[release_idx].clone();

        let moved = distance(&press, &release);
        if moved > config.drag_distance_threshold {
            continue; // left for the drag pass
        }

        let click = ActionEvent {
            id: Uuid::new_v4(),
            recording_id: press.recording_id,
            timestamp: press.timestamp,
            recording_timestamp: press.recording_timestamp,
            name: "click".to_string(),
            mouse_x: press.mouse_x,
            mouse_y: press.mouse_y,
            mouse_dx: None,
            mouse_dy: None,
            mouse_button_name: press.mouse_button_name.clone(),
            mouse_pressed: None,
            key_name: None,
            key_char: None,
            key_vk: None,
            canonical_key_name: None,
            canonical_key_char: None,
            canonical_key_vk: None,
            disabled: false,
            parent_id: None,
            screenshot_id: None,
            window_event_id: None,
            browser_event_id: None,
            browser_event_timestamp: None,
            active_segment_description: None,
            keys: None,
        };

        clicks.push(click);
        consumed.push((press_idx, release_idx));
        outcome.clicks_merged += 1;
    }

    for (click, &(press_idx, release_idx)) in clicks.iter().zip(consumed.iter()) {
        events[press_idx].parent_id = Some(click.id);
        events[press_idx].disabled = true;
        events[release_idx].parent_id = Some(click.id);
        events[release_idx].disabled = true;
    }

    // Second sweep: fold adjacent clicks of the same button into doubleclicks.
    let mut merged_doubles = Vec::new();
    let mut skip_next = false;
    for pair in 0..clicks.len() {
        if skip_next {
            skip_next = false;
            continue;
        }
        if pair + 1 >= clicks.len() {
            continue;
        }
        let a = &clicks[pair];
        let b = &clicks[pair + 1];
        let interval = (b.timestamp - a.timestamp)
            .num_milliseconds()
            .max(0) as f64
            / 1000.0;
        if a.mouse_button_name == b.mouse_button_name
            && interval <= config.double_click_interval_threshold
            && distance(a, b) <= config.double_click_distance_threshold
        {
            let double_click = ActionEvent {
                id: Uuid::new_v4(),
                name: "doubleclick".to_string(),
                ..a.clone()
            };
            merged_doubles.push((pair, pair + 1, double_click));
            skip_next = true;
            outcome.double_clicks_merged += 1;
        }
    }

    for (first, second, double_click) in merged_doubles.iter().rev() {
        clicks[*first].parent_id = Some(double_click.id);
        clicks[*first].disabled = true;
        clicks[*second].parent_id = Some(double_click.id);
        clicks[*second].disabled = true;
    }

    events.extend(clicks);
    events.extend(merged_doubles.into_iter().map(|(_, _, e)| e));
}

/// Pass 4: a `mouse_press`, one or more `mouse_move`s, and a `mouse_release`
/// whose total displacement exceeds `drag_distance_threshold` become a single
/// `drag` event spanning press to release.
pub fn detect_drags(events: &mut Vec<ActionEvent>, config: &RecordingConfig, outcome: &mut MergeOutcome) {
    let presses: Vec<usize> = active(events)
        .filter(|(_, e)| e.name == "mouse_press")
        .map(|(i, _)| i)
        .collect();

    let mut drags = Vec::new();

    for &press_idx in &presses {
        let press = events[press_idx].clone();
        let mut run = vec![press_idx];
        let mut release_idx = None;

        for (i, e) in active(events).skip_while(|(i, _)| *i <= press_idx) {
            if e.name == "mouse_move" {
                run.push(i);
            } else if e.name == "mouse_release" && e.mouse_button_name == press.mouse_button_name {
                release_idx = Some(i);
                run.push(i);
                break;
            } else {
                break;
            }
        }

        let Some(release_idx) = release_idx else {
            continue;
        };
        let release = events[release_idx].clone();
        if distance(&press, &release) <= config.drag_distance_threshold {
            continue; // already handled as a click
        }

        let drag = ActionEvent {
            id: Uuid::new_v4(),
            recording_id: press.recording_id,
            timestamp: press.timestamp,
            recording_timestamp: press.recording_timestamp,
            name: "drag".to_string(),
            mouse_x: release.mouse_x,
            mouse_y: release.mouse_y,
            mouse_dx: release.mouse_x.zip(press.mouse_x).map(|(a, b)| a - b),
            mouse_dy: release.mouse_y.zip(press.mouse_y).map(|(a, b)| a - b),
            mouse_button_name: press.mouse_button_name.clone(),
            mouse_pressed: None,
            key_name: None,
            key_char: None,
            key_vk: None,
            canonical_key_name: None,
            canonical_key_char: None,
            canonical_key_vk: None,
            disabled: false,
            parent_id: None,
            screenshot_id: None,
            window_event_id: None,
            browser_event_id: None,
            browser_event_timestamp: None,
            active_segment_description: None,
            keys: None,
        };

        for &idx in &run {
            events[idx].parent_id = Some(drag.id);
            events[idx].disabled = true;
        }
        drags.push(drag);
        outcome.drags_merged += 1;
    }

    events.extend(drags);
}

/// Pass 5: a run of `key_press`/`key_release` pairs with printable
/// `key_char`s, uninterrupted by a non-keyboard action, becomes a single
/// `type` event whose `active_segment_description` is the concatenated text.
pub fn merge_typed_text(events: &mut Vec<ActionEvent>, outcome: &mut MergeOutcome) {
    let mut runs: Vec<Vec<usize>> = Vec::new();
    let mut current: Vec<usize> = Vec::new();

    for (i, e) in events.iter().enumerate() {
        if e.disabled {
            continue;
        }
        if e.name == "key_press" && e.key_char.is_some() {
            current.push(i);
        } else if e.name == "key_release" {
            continue; // releases ride along implicitly, dropped with their press's run
        } else if !current.is_empty() {
            runs.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }

    let mut typed_events = Vec::new();
    for run in runs {
        if run.is_empty() {
            continue;
        }
        let keys: Vec<String> = run
            .iter()
            .filter_map(|&i| events[i].key_char.clone())
            .collect();
        if keys.is_empty() {
            continue;
        }
        let text: String = keys.concat();

        let first = events[run[0]].clone();
        let typed = ActionEvent {
            id: Uuid::new_v4(),
            recording_id: first.recording_id,
            timestamp: first.timestamp,
            recording_timestamp: first.recording_timestamp,
            name: "type".to_string(),
            mouse_x: None,
            mouse_y: None,
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
            disabled: false,
            parent_id: None,
            screenshot_id: None,
            window_event_id: None,
            browser_event_id: None,
            browser_event_timestamp: None,
            active_segment_description: Some(text),
            keys: Some(sqlx::types::Json(keys)),
        };

        for &idx in &run {
            events[idx].parent_id = Some(typed.id);
            events[idx].disabled = true;
        }
        typed_events.push(typed);
        outcome.typed_runs_merged += 1;
    }

    events.extend(typed_events);
}

fn distance(a: &ActionEvent, b: &ActionEvent) -> f64 {
    match (a.mouse_x, a.mouse_y, b.mouse_x, b.mouse_y) {
        (Some(ax), Some(ay), Some(bx), Some(by)) => ((bx - ax).powi(2) + (by - ay).powi(2)).sqrt(),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn base_event(name: &str, offset_ms: i64) -> ActionEvent {
        ActionEvent {
            id: Uuid::new_v4(),
            recording_id: Uuid::new_v4(),
            timestamp: Utc::now() + chrono::Duration::milliseconds(offset_ms),
            recording_timestamp: offset_ms as f64 / 1000.0,
            name: name.to_string(),
            mouse_x: None,
            mouse_y: None,
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
            disabled: false,
            parent_id: None,
            screenshot_id: None,
            window_event_id: None,
            browser_event_id: None,
            browser_event_timestamp: None,
            active_segment_description: None,
            keys: None,
        }
    }

    fn mouse_event(name: &str, offset_ms: i64, x: f64, y: f64, button: &str) -> ActionEvent {
        let mut e = base_event(name, offset_ms);
        e.mouse_x = Some(x);
        e.mouse_y = Some(y);
        e.mouse_button_name = Some(button.to_string());
        e.mouse_pressed = Some(name == "mouse_press");
        e
    }

    fn key_event(name: &str, offset_ms: i64, ch: &str) -> ActionEvent {
        let mut e = base_event(name, offset_ms);
        e.key_name = Some(ch.to_string());
        if name == "key_press" {
            e.key_char = Some(ch.to_string());
        }
        e
    }

    #[test]
    fn single_click_is_merged_from_press_and_release() {
        let mut events = vec![
            mouse_event("mouse_press", 0, 100.0, 100.0, "left"),
            mouse_event("mouse_release", 50, 100.0, 100.0, "left"),
        ];
        let config = RecordingConfig::default();
        let outcome = crate::merge_events(std::mem::take(&mut events), &config);

        assert_eq!(outcome.clicks_merged, 1);
        let click = outcome.events.iter().find(|e| e.name == "click").unwrap();
        assert_eq!(click.mouse_x, Some(100.0));
        assert!(outcome.events.iter().filter(|e| e.name == "mouse_press").all(|e| e.disabled));
    }

    #[test]
    fn two_close_clicks_become_a_double_click() {
        let mut events = vec![
            mouse_event("mouse_press", 0, 100.0, 100.0, "left"),
            mouse_event("mouse_release", 20, 100.0, 100.0, "left"),
            mouse_event("mouse_press", 150, 101.0, 100.0, "left"),
            mouse_event("mouse_release", 170, 101.0, 100.0, "left"),
        ];
        let config = RecordingConfig::default();
        let outcome = crate::merge_events(std::mem::take(&mut events), &config);

        assert_eq!(outcome.double_clicks_merged, 1);
        assert!(outcome.events.iter().any(|e| e.name == "doubleclick"));
    }

    #[test]
    fn press_move_release_beyond_threshold_is_a_drag() {
        let mut events = vec![
            mouse_event("mouse_press", 0, 100.0, 100.0, "left"),
            mouse_event("mouse_move", 20, 150.0, 100.0, "left"),
            mouse_event("mouse_move", 40, 200.0, 100.0, "left"),
            mouse_event("mouse_release", 60, 200.0, 100.0, "left"),
        ];
        let config = RecordingConfig::default();
        let outcome = crate::merge_events(std::mem::take(&mut events), &config);

        assert_eq!(outcome.drags_merged, 1);
        let drag = outcome.events.iter().find(|e| e.name == "drag").unwrap();
        assert_eq!(drag.mouse_x, Some(200.0));

        let children = outcome
            .events
            .iter()
            .filter(|e| e.parent_id == Some(drag.id))
            .count();
        assert_eq!(
            children, 4,
            "press + two intervening moves + release must all attach to the drag"
        );
    }

    #[test]
    fn keyboard_run_merges_into_typed_text() {
        let mut events = vec![
            key_event("key_press", 0, "h"),
            key_event("key_release", 10, "h"),
            key_event("key_press", 20, "i"),
            key_event("key_release", 30, "i"),
        ];
        let config = RecordingConfig::default();
        let outcome = crate::merge_events(std::mem::take(&mut events), &config);

        assert_eq!(outcome.typed_runs_merged, 1);
        let typed = outcome.events.iter().find(|e| e.name == "type").unwrap();
        assert_eq!(typed.active_segment_description.as_deref(), Some("hi"));
        assert_eq!(
            typed.keys.as_ref().map(|k| k.0.clone()),
            Some(vec!["h".to_string(), "i".to_string()])
        );
    }

    #[test]
    fn auto_repeat_key_press_is_collapsed() {
        let mut events = vec![
            key_event("key_press", 0, "a"),
            key_event("key_press", 10, "a"),
            key_event("key_press", 20, "a"),
            key_event("key_release", 30, "a"),
        ];
        let config = RecordingConfig::default();
        let outcome = crate::merge_events(std::mem::take(&mut events), &config);
        assert_eq!(outcome.invalid_keyboard_dropped, 2);
    }

    #[test]
    fn merging_already_merged_output_is_a_no_op() {
        let events = vec![
            mouse_event("mouse_press", 0, 100.0, 100.0, "left"),
            mouse_event("mouse_release", 20, 100.0, 100.0, "left"),
        ];
        let config = RecordingConfig::default();
        let first_pass = crate::merge_events(events, &config);
        let second_pass = crate::merge_events(first_pass.events.clone(), &config);

        assert_eq!(second_pass.clicks_merged, 0);
        assert_eq!(second_pass.events.len(), first_pass.events.len());
    }
}
