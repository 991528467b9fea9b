//! Pure tumbling-window arithmetic, per `spec.md` §4.6: a 10-minute
//! window shifted back by a 15-minute safety lag so the replicator never
//! touches rows still eligible for late hot-side writes.

use chrono::{DateTime, Duration as ChronoDuration, Utc};

pub const WINDOW: ChronoDuration = ChronoDuration::minutes(10);
pub const SAFETY_LAG: ChronoDuration = ChronoDuration::minutes(15);

/// The next `[start, end)` window to replicate, or `None` if the window
/// following `last_window_end` would extend past `now - SAFETY_LAG`.
pub fn next_window(
    last_window_end: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = last_window_end;
    let end = start + WINDOW;
    if end <= now - SAFETY_LAG {
        Some((start, end))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(minute * 60, 0).unwrap()
    }

    #[test]
    fn window_is_available_once_past_the_safety_lag() {
        let last_end = at(0);
        let now = at(25); // 25 min elapsed: window [0,10) ends at 10, now-lag=10 -> eligible
        assert_eq!(next_window(last_end, now), Some((at(0), at(10))));
    }

    #[test]
    fn window_not_yet_available_within_the_safety_lag() {
        let last_end = at(0);
        let now = at(20); // now-lag=5, window end=10 > 5: not yet
        assert_eq!(next_window(last_end, now), None);
    }

    #[test]
    fn successive_windows_tumble_forward_without_gaps() {
        let (start1, end1) = next_window(at(0), at(100)).unwrap();
        let (start2, end2) = next_window(end1, at(100)).unwrap();
        assert_eq!((start1, end1), (at(0), at(10)));
        assert_eq!((start2, end2), (at(10), at(20)));
    }
}
