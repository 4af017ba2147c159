//! Bounded exponential backoff keyed by object.
//!
//! The controller runtime calls the error policy once per failed reconcile.
//! Each key keeps its own failure count, so one broken server does not slow
//! down the others.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;

#[derive(Debug)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    failures: Mutex<HashMap<String, u32>>,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(300))
    }
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Records a failure for `key` and returns how long to wait before the
    /// next attempt. Transient failures retry after `base` without growing.
    pub fn next_delay(&self, key: &str, transient: bool) -> Duration {
        let mut failures = self.failures.lock();
        let count = failures.entry(key.to_string()).or_insert(0);
        *count = count.saturating_add(1);

        if transient {
            return self.base;
        }
        let exponent = (*count - 1).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .map_or(self.max, |delay| delay.min(self.max))
    }

    pub fn reset(&self, key: &str) {
        self.failures.lock().remove(key);
    }

    pub fn failures(&self, key: &str) -> u32 {
        self.failures.lock().get(key).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_capped() {
        let backoff = Backoff::new(Duration::from_secs(5), Duration::from_secs(60));
        let delays: Vec<u64> = (0..6)
            .map(|_| backoff.next_delay("games/v1", false).as_secs())
            .collect();
        assert_eq!(delays, vec![5, 10, 20, 40, 60, 60]);
        assert_eq!(backoff.failures("games/v1"), 6);
    }

    #[test]
    fn keys_are_independent_and_reset() {
        let backoff = Backoff::default();
        backoff.next_delay("games/a", false);
        backoff.next_delay("games/a", false);
        assert_eq!(
            backoff.next_delay("games/b", false),
            Duration::from_secs(5)
        );

        backoff.reset("games/a");
        assert_eq!(backoff.failures("games/a"), 0);
        assert_eq!(
            backoff.next_delay("games/a", false),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn transient_failures_do_not_escalate() {
        let backoff = Backoff::default();
        for _ in 0..10 {
            assert_eq!(backoff.next_delay("games/v1", true), Duration::from_secs(5));
        }
    }

    #[test]
    fn huge_counts_saturate_at_max() {
        let backoff = Backoff::new(Duration::from_secs(5), Duration::from_secs(300));
        let mut last = Duration::ZERO;
        for _ in 0..100 {
            last = backoff.next_delay("games/v1", false);
        }
        assert_eq!(last, Duration::from_secs(300));
    }
}
