//! Wait-duration calculation between status checks.

use std::time::Duration;

use crate::polling::{BackoffMode, PollingConfig};

/// Delay before status check number `attempt` (1-based).
///
/// Fixed mode always returns `base_interval`. Exponential mode returns
/// `min(base_interval * 2^(attempt - 1), max_interval)`, so the first
/// wait after the initial running status is exactly `base_interval`.
/// An `attempt` of 0 is treated as 1.
pub fn next_delay(attempt: u32, config: &PollingConfig) -> Duration {
    match config.backoff_mode {
        BackoffMode::Fixed => config.base_interval,
        BackoffMode::Exponential => {
            let exponent = attempt.saturating_sub(1);
            let grown = 1u32
                .checked_shl(exponent)
                .and_then(|factor| config.base_interval.checked_mul(factor))
                .unwrap_or(config.max_interval);
            grown.min(config.max_interval)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exponential(base_ms: u64, cap_ms: u64) -> PollingConfig {
        PollingConfig::default()
            .with_base_interval(Duration::from_millis(base_ms))
            .exponential(Duration::from_millis(cap_ms))
    }

    #[test]
    fn fixed_mode_ignores_attempt() {
        let config = PollingConfig::default().with_base_interval(Duration::from_millis(2000));
        for attempt in [0, 1, 2, 10, 1000] {
            assert_eq!(next_delay(attempt, &config), Duration::from_millis(2000));
        }
    }

    #[test]
    fn first_exponential_wait_is_base() {
        let config = exponential(1000, 5000);
        assert_eq!(next_delay(1, &config), Duration::from_millis(1000));
        assert_eq!(next_delay(0, &config), Duration::from_millis(1000));
    }

    #[test]
    fn full_exponential_sequence() {
        let config = exponential(1000, 5000);
        let expected = [1000, 2000, 4000, 5000, 5000, 5000];

        for (i, &expected_ms) in expected.iter().enumerate() {
            let attempt = i as u32 + 1;
            assert_eq!(next_delay(attempt, &config).as_millis() as u64, expected_ms);
        }
    }

    #[test]
    fn matches_closed_form_below_cap() {
        let config = exponential(250, 60_000);
        for attempt in 1..=8u32 {
            let expected = (250u64 * 2u64.pow(attempt - 1)).min(60_000);
            assert_eq!(next_delay(attempt, &config), Duration::from_millis(expected));
        }
    }

    #[test]
    fn huge_attempts_saturate_at_cap() {
        let config = exponential(1000, 5000);
        assert_eq!(next_delay(40, &config), Duration::from_millis(5000));
        assert_eq!(next_delay(u32::MAX, &config), Duration::from_millis(5000));
    }
}
