//! Fixed-interval retry policy.
//!
//! Production firmware retries forever ([`RetryPolicy::unbounded`]); tests and
//! hosts that want to give up use [`RetryPolicy::bounded`].

use crate::clock::Clock;
use std::time::Duration;

/// How often, and how many times, to retry a failing step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Wait between two attempts.
    pub interval: Duration,
    /// Maximum number of attempts, `None` for no limit.
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub fn unbounded(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
        }
    }

    pub fn bounded(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: Some(max_attempts),
        }
    }

    /// Call `attempt` until it returns `true`, sleeping `interval` after each
    /// failure.
    ///
    /// Returns the number of attempts made on success, or `None` once the
    /// attempt budget is spent. No sleep follows the final failed attempt.
    pub fn run<C, F>(&self, clock: &C, mut attempt: F) -> Option<u32>
    where
        C: Clock + ?Sized,
        F: FnMut(u32) -> bool,
    {
        let mut made = 0u32;
        loop {
            made = made.saturating_add(1);
            if attempt(made) {
                return Some(made);
            }
            if self.max_attempts.is_some_and(|max| made >= max) {
                return None;
            }
            clock.sleep(self.interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ManualClock;

    #[test]
    fn test_succeeds_first_try_without_sleeping() {
        let clock = ManualClock::new();
        let policy = RetryPolicy::unbounded(Duration::from_millis(500));

        assert_eq!(policy.run(&clock, |_| true), Some(1));
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn test_sleeps_between_attempts() {
        let clock = ManualClock::new();
        let policy = RetryPolicy::unbounded(Duration::from_millis(500));

        let attempts = policy.run(&clock, |n| n == 3);

        assert_eq!(attempts, Some(3));
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_millis(500), Duration::from_millis(500)]
        );
    }

    #[test]
    fn test_bounded_gives_up() {
        let clock = ManualClock::new();
        let policy = RetryPolicy::bounded(Duration::from_secs(2), 4);

        let mut calls = 0;
        let result = policy.run(&clock, |_| {
            calls += 1;
            false
        });

        assert_eq!(result, None);
        assert_eq!(calls, 4);
        assert_eq!(clock.sleeps().len(), 3);
    }
}
