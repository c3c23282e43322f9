//! Linear backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Delay before retry number `attempt` (1-based).
///
/// Grows linearly with the attempt (`min_ms * attempt`), adds up to `min_ms`
/// of random jitter and never exceeds `max_ms`.
pub fn calculate_backoff(attempt: u32, min_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let linear = min_ms.saturating_mul(u64::from(attempt));
    let jitter = if min_ms > 0 {
        rand::thread_rng().gen_range(0..min_ms)
    } else {
        0
    };

    Duration::from_millis(linear.saturating_add(jitter).min(max_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_linearly() {
        for attempt in 1..=5u32 {
            let delay = calculate_backoff(attempt, 100, 10_000).as_millis() as u64;
            let floor = 100 * u64::from(attempt);
            assert!(delay >= floor, "attempt {}: {} < {}", attempt, delay, floor);
            assert!(delay < floor + 100, "attempt {}: {} too large", attempt, delay);
        }
    }

    #[test]
    fn test_backoff_is_capped() {
        for _ in 0..50 {
            assert!(calculate_backoff(40, 100, 1_000) <= Duration::from_millis(1_000));
        }
        assert_eq!(calculate_backoff(u32::MAX, u64::MAX, 2_000), Duration::from_millis(2_000));
    }

    #[test]
    fn test_zero_attempt_and_zero_min() {
        assert_eq!(calculate_backoff(0, 100, 1_000), Duration::ZERO);
        assert_eq!(calculate_backoff(3, 0, 1_000), Duration::ZERO);
    }
}
