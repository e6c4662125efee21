//! Backoff between optimistic-write attempts.

use crate::config::RetryPolicy;
use rand::Rng;
use std::time::Duration;

/// Full-jitter delay: uniform in `[0, ceiling]` for the given failure count.
pub(crate) fn jittered_delay(policy: &RetryPolicy, failed_attempts: u32) -> Duration {
    let ceiling_ms = u64::try_from(policy.backoff_ceiling(failed_attempts).as_millis())
        .unwrap_or(u64::MAX);
    if ceiling_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=ceiling_ms))
}

/// Sleeps for one jittered backoff step.
pub(crate) fn back_off(policy: &RetryPolicy, failed_attempts: u32) {
    let delay = jittered_delay(policy, failed_attempts);
    if !delay.is_zero() {
        std::thread::sleep(delay);
    }
}

#[cfg(test)]
mod tests {
    use super::jittered_delay;
    use crate::config::RetryPolicy;
    use std::time::Duration;

    #[test]
    fn delay_stays_within_ceiling() {
        let policy = RetryPolicy {
            max_attempts: 8,
            base_delay_ms: 4,
            max_delay_ms: 20,
        };
        for failed in 1..8 {
            let delay = jittered_delay(&policy, failed);
            assert!(delay <= policy.backoff_ceiling(failed));
        }
    }

    #[test]
    fn zero_base_never_sleeps() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 0,
            max_delay_ms: 0,
        };
        assert_eq!(jittered_delay(&policy, 5), Duration::ZERO);
    }
}
