//! Exponential backoff with jitter.

use rand::Rng;
use std::time::Duration;

/// Delay before retry number `attempt` (1-based); zero for attempt 0.
///
/// Doubles from `base` up to `max` and adds up to 10% jitter.
pub fn calculate_backoff(attempt: u32, base: Duration, max: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let base_ms = base.as_millis() as u64;
    let max_ms = max.as_millis() as u64;
    let factor = 2u64.saturating_pow(attempt - 1);
    let capped = base_ms.saturating_mul(factor).min(max_ms);

    let jitter_range = capped / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        let base = Duration::from_millis(100);
        let max = Duration::from_millis(1000);

        assert_eq!(calculate_backoff(0, base, max), Duration::ZERO);
        assert!(calculate_backoff(1, base, max) >= base);
        assert!(calculate_backoff(2, base, max) >= Duration::from_millis(200));

        let capped = calculate_backoff(10, base, max);
        assert!(capped >= max);
        assert!(capped < Duration::from_millis(1100));
    }

    #[test]
    fn test_backoff_survives_huge_attempts() {
        let d = calculate_backoff(200, Duration::from_millis(50), Duration::from_secs(2));
        assert!(d >= Duration::from_secs(2));
    }
}
