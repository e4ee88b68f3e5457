//! Exponential backoff with jitter for adapter reconnects, since
//! adapters reconnect over an unbounded number of transient failures
//! up to a hard attempt cap.

use std::time::Duration;

use rand::Rng;

/// Max reconnect attempts before an adapter gives up and surfaces
/// `AdapterFatal`.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

const BASE_DELAY_MS: u64 = 100;
const MAX_DELAY_MS: u64 = 3_200;

/// Delay before reconnect attempt `attempt` (1-indexed), doubling each
/// time and capped, with +/-20% jitter to avoid thundering-herd
/// reconnect storms.
pub fn reconnect_delay(attempt: u32) -> Duration {
    let exp = BASE_DELAY_MS.saturating_mul(1u64 << attempt.min(6));
    let capped = exp.min(MAX_DELAY_MS);
    let jitter_frac = rand::thread_rng().gen_range(0.8..1.2);
    Duration::from_millis((capped as f64 * jitter_frac) as u64)
}

/// Jittered delay in the `[min_ms, max_ms]` range, used for STT retry
/// backoff (100-500ms).
pub fn jittered_delay(min_ms: u64, max_ms: u64) -> Duration {
    let ms = if min_ms >= max_ms {
        min_ms
    } else {
        rand::thread_rng().gen_range(min_ms..=max_ms)
    };
    Duration::from_millis(ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconnect_delay_grows_with_attempt() {
        let d1 = reconnect_delay(1).as_millis();
        let d4 = reconnect_delay(4).as_millis();
        assert!(d4 > d1 / 2);
    }

    #[test]
    fn reconnect_delay_is_capped() {
        let d = reconnect_delay(20).as_millis() as u64;
        assert!(d <= (MAX_DELAY_MS as f64 * 1.21) as u64);
    }

    #[test]
    fn jittered_delay_stays_in_range() {
        for _ in 0..50 {
            let ms = jittered_delay(100, 500).as_millis() as u64;
            assert!((100..=500).contains(&ms));
        }
    }
}
