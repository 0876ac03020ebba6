//! Linear retry backoff.
//!
//! The delay before attempt `n` (n >= 2) is `base × (n − 1)`. No jitter and
//! no exponent keep the worst-case latency of a call predictable:
//! `attempts × timeout + base × attempts × (attempts − 1) / 2`.

use std::time::Duration;

/// Delay to wait before `attempt` (1-based). The first attempt never waits.
pub fn calculate_backoff(attempt: u32, base: Duration) -> Duration {
    if attempt <= 1 {
        return Duration::ZERO;
    }
    base.saturating_mul(attempt - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_calculation() {
        let base = Duration::from_millis(1000);
        assert_eq!(calculate_backoff(0, base), Duration::ZERO);
        assert_eq!(calculate_backoff(1, base), Duration::ZERO);
        assert_eq!(calculate_backoff(2, base), Duration::from_millis(1000));
        assert_eq!(calculate_backoff(3, base), Duration::from_millis(2000));
        assert_eq!(calculate_backoff(4, base), Duration::from_millis(3000));
    }

    #[test]
    fn saturates_instead_of_overflowing() {
        assert_eq!(calculate_backoff(u32::MAX, Duration::MAX), Duration::MAX);
    }
}
