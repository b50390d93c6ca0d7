use chrono::{DateTime, Utc};

/// Compute the presentation timestamp, in frame units, for a frame captured
/// at `frame_ts` relative to `video_start`, at `fps` frames per second.
///
/// `pts = round((frame_ts - video_start) * fps)`, nudged forward by one unit
/// whenever the raw candidate would not strictly exceed `last_pts` — screen
/// capture timestamps are not perfectly evenly spaced, so naive rounding can
/// occasionally produce two frames with the same or a decreasing PTS, which
/// most H.264 muxers reject outright.
pub fn compute_pts(
    frame_ts: DateTime<Utc>,
    video_start: DateTime<Utc>,
    fps: u32,
    last_pts: Option<i64>,
) -> i64 {
    let elapsed_secs = (frame_ts - video_start).num_nanoseconds().unwrap_or(0) as f64 / 1e9;
    let candidate = (elapsed_secs * fps as f64).round() as i64;

    match last_pts {
        Some(last) if candidate <= last => last + 1,
        _ => candidate.max(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_frame_has_pts_zero() {
        let start = Utc::now();
        assert_eq!(compute_pts(start, start, 15, None), 0);
    }

    #[test]
    fn pts_scales_with_elapsed_time_and_fps() {
        let start = Utc::now();
        let one_second_later = start + chrono::Duration::seconds(1);
        assert_eq!(compute_pts(one_second_later, start, 15, Some(0)), 15);
    }

    #[test]
    fn non_increasing_candidate_is_nudged_forward() {
        let start = Utc::now();
        // Two frames captured at the same instant would both round to the same pts.
        let pts_a = compute_pts(start, start, 30, None);
        let pts_b = compute_pts(start, start, 30, Some(pts_a));
        assert!(pts_b > pts_a);
        assert_eq!(pts_b, pts_a + 1);
    }

    #[test]
    fn pts_is_monotonic_across_a_realistic_sequence() {
        let start = Utc::now();
        let mut last = None;
        let mut prev_pts = -1i64;
        for ms in [0, 33, 64, 100, 101, 150, 300] {
            let ts = start + chrono::Duration::milliseconds(ms);
            let pts = compute_pts(ts, start, 30, last);
            assert!(pts > prev_pts);
            prev_pts = pts;
            last = Some(pts);
        }
    }
}
