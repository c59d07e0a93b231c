//! Backoff policy: how long to wait before the next retry.

use rand::Rng;
use std::time::Duration;

/// Capped exponential backoff with additive jitter.
///
/// `delay(attempt) = min(base * 2^attempt, cap) + uniform[0, base)`
///
/// Example with base=2s, cap=300s:
/// - attempt 1: 4s  (+ <2s jitter)
/// - attempt 2: 8s
/// - attempt 3: 16s
/// - attempt 8: 300s (capped)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
}

impl BackoffPolicy {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    /// Deterministic part of the delay, before jitter.
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.cap, |d| d.min(self.cap))
    }

    /// 乱数源を渡せる版（テストでは seed 固定の StdRng を使う）
    pub fn delay_with<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let base_ms = u64::try_from(self.base.as_millis()).unwrap_or(u64::MAX);
        let jitter = if base_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rng.gen_range(0..base_ms))
        };
        self.ceiling(attempt) + jitter
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with(attempt, &mut rand::thread_rng())
    }
}

/// std → chrono. Out-of-range values saturate to a century.
pub(crate) fn as_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::days(36_500))
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), Duration::from_secs(300))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rstest::rstest;

    #[rstest]
    #[case::first(1, 4)]
    #[case::second(2, 8)]
    #[case::third(3, 16)]
    #[case::capped(8, 300)]
    #[case::huge_attempt(200, 300)]
    fn ceiling_doubles_until_cap(#[case] attempt: u32, #[case] secs: u64) {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.ceiling(attempt), Duration::from_secs(secs));
    }

    #[test]
    fn jitter_stays_below_base() {
        let policy = BackoffPolicy::default();
        let mut rng = StdRng::seed_from_u64(7);

        for attempt in 1..6 {
            let ceiling = policy.ceiling(attempt);
            let d = policy.delay_with(attempt, &mut rng);
            assert!(d >= ceiling);
            assert!(d < ceiling + policy.base);
        }
    }

    #[test]
    fn delays_strictly_increase_below_cap() {
        // jitter < base なので、cap に届くまでは前回の最大値より次回の最小値が大きい
        let policy = BackoffPolicy::default();
        let mut previous = Duration::ZERO;
        for attempt in 1..5 {
            let d = policy.delay(attempt);
            assert!(d > previous, "attempt {attempt}: {d:?} <= {previous:?}");
            previous = d;
        }
    }

    #[test]
    fn zero_base_means_no_delay() {
        let policy = BackoffPolicy::new(Duration::ZERO, Duration::from_secs(10));
        assert_eq!(policy.delay(3), Duration::ZERO);
    }
}
