//! Reconnect backoff policy.
//!
//! The delay before retry `n` (zero-based) is `min(cap, base * 2^n)`. Once
//! `max_attempts` retries have been scheduled without a successful open, the
//! policy refuses further retries and the channel fails stop.

use std::time::Duration;

/// Exponential backoff with a ceiling and a retry cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
    cap: Duration,
    max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Self::DEFAULT_BASE,
            cap: Self::DEFAULT_CAP,
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl BackoffPolicy {
    /// Delay before the first retry.
    pub const DEFAULT_BASE: Duration = Duration::from_millis(1000);
    /// Upper bound on any single delay.
    pub const DEFAULT_CAP: Duration = Duration::from_millis(10_000);
    /// Retries allowed before giving up.
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

    /// Creates a policy. `cap` is raised to `base` if smaller.
    #[must_use]
    pub fn new(base: Duration, cap: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            cap: cap.max(base),
            max_attempts,
        }
    }

    /// Base delay.
    #[must_use]
    pub fn base(&self) -> Duration {
        self.base
    }

    /// Delay ceiling.
    #[must_use]
    pub fn cap(&self) -> Duration {
        self.cap
    }

    /// Retry cap.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retry number `attempt` (zero-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.cap, |delay| delay.min(self.cap))
    }

    /// Whether `attempt` retries already used up the budget.
    #[must_use]
    pub fn is_exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }

    /// Schedules the next retry, or `None` when the budget is spent.
    pub fn next_delay(&self, retry: &mut RetryState) -> Option<Duration> {
        if self.is_exhausted(retry.attempts) {
            return None;
        }
        let delay = self.delay(retry.attempts);
        retry.attempts += 1;
        Some(delay)
    }
}

/// Retries scheduled since the last successful open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    attempts: u32,
}

impl RetryState {
    /// Retries scheduled so far.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Back to zero after an open or a manual disconnect.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.base(), Duration::from_millis(1000));
        assert_eq!(policy.cap(), Duration::from_millis(10_000));
        assert_eq!(policy.max_attempts(), 5);
    }

    #[test]
    fn test_delay_doubles_until_cap() {
        let policy = BackoffPolicy::default();
        let delays: Vec<u64> = (0..6).map(|n| policy.delay(n).as_millis() as u64).collect();

        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 10_000, 10_000]);
    }

    #[test]
    fn test_delay_is_non_decreasing_and_bounded() {
        let policy = BackoffPolicy::new(Duration::from_millis(150), Duration::from_secs(7), 40);
        let mut previous = Duration::ZERO;

        for attempt in 0..40 {
            let delay = policy.delay(attempt);
            assert!(delay >= previous, "attempt {} went backwards", attempt);
            assert!(delay <= policy.cap());
            let expected = Duration::from_millis(150)
                .checked_mul(2u32.saturating_pow(attempt))
                .unwrap_or(Duration::MAX)
                .min(Duration::from_secs(7));
            assert_eq!(delay, expected);
            previous = delay;
        }
    }

    #[test]
    fn test_delay_does_not_overflow_on_large_attempts() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay(32), policy.cap());
        assert_eq!(policy.delay(u32::MAX), policy.cap());
    }

    #[test]
    fn test_cap_below_base_is_raised() {
        let policy = BackoffPolicy::new(Duration::from_secs(2), Duration::from_secs(1), 3);
        assert_eq!(policy.cap(), Duration::from_secs(2));
        assert_eq!(policy.delay(0), Duration::from_secs(2));
    }

    #[test]
    fn test_next_delay_consumes_budget() {
        let policy = BackoffPolicy::new(Duration::from_millis(100), Duration::from_secs(1), 3);
        let mut retry = RetryState::default();

        assert_eq!(policy.next_delay(&mut retry), Some(Duration::from_millis(100)));
        assert_eq!(policy.next_delay(&mut retry), Some(Duration::from_millis(200)));
        assert_eq!(policy.next_delay(&mut retry), Some(Duration::from_millis(400)));
        assert_eq!(retry.attempts(), 3);
        assert_eq!(policy.next_delay(&mut retry), None);
        assert_eq!(retry.attempts(), 3);
    }

    #[test]
    fn test_reset_restores_first_delay() {
        let policy = BackoffPolicy::default();
        let mut retry = RetryState::default();

        policy.next_delay(&mut retry);
        policy.next_delay(&mut retry);
        retry.reset();

        assert_eq!(retry.attempts(), 0);
        assert_eq!(policy.next_delay(&mut retry), Some(policy.base()));
    }
}
