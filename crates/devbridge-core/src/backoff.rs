//! Exponential backoff schedule.

use std::time::Duration;

/// Delay to wait before the 1-based `attempt`.
///
/// The first attempt starts immediately. Attempt `k >= 2` waits
/// `base * 2^(k-2)`, never more than `max`.
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    if attempt <= 1 {
        return Duration::ZERO;
    }
    let exponent = (attempt - 2).min(31);
    base.checked_mul(1u32 << exponent)
        .map_or(max, |delay| delay.min(max))
}

/// Sum of the delays before attempts `1..=attempts`.
pub fn total_backoff(attempts: u32, base: Duration, max: Duration) -> Duration {
    (1..=attempts).map(|k| backoff_delay(k, base, max)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Duration = Duration::from_millis(100);
    const MAX: Duration = Duration::from_secs(1);

    #[test]
    fn test_first_attempt_has_no_delay() {
        assert_eq!(backoff_delay(0, BASE, MAX), Duration::ZERO);
        assert_eq!(backoff_delay(1, BASE, MAX), Duration::ZERO);
    }

    #[test]
    fn test_doubling() {
        assert_eq!(backoff_delay(2, BASE, MAX), Duration::from_millis(100));
        assert_eq!(backoff_delay(3, BASE, MAX), Duration::from_millis(200));
        assert_eq!(backoff_delay(4, BASE, MAX), Duration::from_millis(400));
        assert_eq!(backoff_delay(5, BASE, MAX), Duration::from_millis(800));
    }

    #[test]
    fn test_capped() {
        assert_eq!(backoff_delay(6, BASE, MAX), MAX);
        assert_eq!(backoff_delay(1_000, BASE, MAX), MAX);
    }

    #[test]
    fn test_total() {
        assert_eq!(total_backoff(4, BASE, MAX), Duration::from_millis(700));
        assert_eq!(total_backoff(1, BASE, MAX), Duration::ZERO);
    }
}
