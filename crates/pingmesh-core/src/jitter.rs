//! Sampling-delay jitter.

use std::time::Duration;

use rand::Rng;

/// A millisecond duration of `secs` seconds jittered by +/- `pct`/2
/// percent, drawn uniformly. `pct` is clamped to `[1, 200]`; 200 is the
/// ceiling at which the low end of the range touches zero, so the result
/// is never negative.
pub fn jitter_pct(secs: i64, pct: i64) -> Duration {
    let pct = pct.clamp(1, 200);

    let msec = (secs.max(0) * 1000) as f64;
    let jitter = (msec * pct as f64 / 100.0) * (rand::thread_rng().gen::<f64>() - 0.5);

    Duration::from_millis((msec + jitter).max(0.0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ten_percent_stays_within_a_second_of_ten() {
        for _ in 0..1000 {
            let d = jitter_pct(10, 10);
            assert!(d >= Duration::from_millis(9000), "low: {:?}", d);
            assert!(d <= Duration::from_millis(11000), "high: {:?}", d);
        }
    }

    #[test]
    fn oversized_pct_is_clamped_and_non_negative() {
        for _ in 0..1000 {
            let d = jitter_pct(1, 300);
            assert!(d <= Duration::from_millis(2000), "high: {:?}", d);
        }
    }

    #[test]
    fn tiny_pct_is_raised_to_one() {
        for _ in 0..100 {
            let d = jitter_pct(10, 0);
            assert!(d >= Duration::from_millis(9950), "low: {:?}", d);
            assert!(d <= Duration::from_millis(10050), "high: {:?}", d);
        }
    }
}
