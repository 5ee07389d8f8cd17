//! Humanized delays: a progressive jittered delay between rotation group
//! starts, and a jittered sleep between quota monitor polls, both to avoid
//! every loop waking on the same tick.

use std::time::Duration;

use rand::Rng;

fn humanized(base_secs: f64, jitter_fraction: f64) -> Duration {
    let jitter = rand::thread_rng().gen_range(-jitter_fraction..=jitter_fraction);
    let secs = (base_secs * (1.0 + jitter)).max(0.0);
    Duration::from_secs_f64(secs)
}

/// ~3s baseline + ~1s per index, ±30% jitter.
pub fn progressive_start_delay(index: usize) -> Duration {
    humanized(3.0 + index as f64, 0.3)
}

/// ~2s ± jitter between quota-monitor stop calls.
pub fn quota_monitor_stop_delay() -> Duration {
    humanized(2.0, 0.3)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progressive_delay_grows_with_index() {
        // Jitter is bounded at ±30%, so even worst-case overlap the later
        // index's *expected* delay dominates; sample enough to be stable.
        let d0: f64 = (0..50).map(|_| progressive_start_delay(0).as_secs_f64()).sum::<f64>() / 50.0;
        let d5: f64 = (0..50).map(|_| progressive_start_delay(5).as_secs_f64()).sum::<f64>() / 50.0;
        assert!(d5 > d0);
    }

    #[test]
    fn quota_monitor_delay_is_near_two_seconds() {
        let d = quota_monitor_stop_delay().as_secs_f64();
        assert!((0.0..=3.0).contains(&d), "d={d}");
    }
}
