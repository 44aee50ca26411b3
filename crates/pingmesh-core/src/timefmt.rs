//! Elapsed-time formatting and second-truncated timestamps.

use chrono::{DateTime, DurationRound, TimeDelta, Utc};

/// Seconds as `01h15m22s`, leaving off zero hour and minute prefixes.
pub fn hhmmss(secs: i64) -> String {
    let secs = secs.max(0);
    let hr = secs / 3600;
    let min = (secs % 3600) / 60;
    let secs = secs % 60;

    if hr > 0 {
        format!("{}h{:02}m{:02}s", hr, min, secs)
    } else if min > 0 {
        format!("{}m{:02}s", min, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Elapsed time since `since`, with a day prefix for long uptimes.
pub fn hhmmss_d(since: DateTime<Utc>) -> String {
    let secs = (Utc::now() - since).num_seconds().max(0);
    let days = secs / 86_400;
    if days > 0 {
        format!("{}d{}", days, hhmmss(secs % 86_400))
    } else {
        hhmmss(secs)
    }
}

/// Now in UTC, truncated to whole seconds, the granularity peer
/// timestamps are kept at.
pub fn now_second() -> DateTime<Utc> {
    Utc::now()
        .duration_trunc(TimeDelta::seconds(1))
        .expect("second truncation cannot overflow")
}
