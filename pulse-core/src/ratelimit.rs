//! Sliding-window-log rate limiting.
//!
//! Process-wide mutable state: one timestamp log per key, pruned on every
//! check. Created at startup, dropped at shutdown. Callers that outlive
//! their keys (source addresses, workspaces) rely on the prune to keep the
//! map bounded by live traffic.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Sliding window log limiter: at most `limit` events per `window`, keyed
/// by an opaque string (source address, workspace id).
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    limit: usize,
    window: Duration,
    log: Mutex<HashMap<String, Vec<Instant>>>,
}

impl SlidingWindowLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            log: Mutex::new(HashMap::new()),
        }
    }

    /// Record an attempt for `key`; true when it fits inside the window.
    pub fn allow(&self, key: &str) -> bool {
        self.allow_at(key, Instant::now())
    }

    fn allow_at(&self, key: &str, now: Instant) -> bool {
        let mut log = self.log.lock();
        let entries = log.entry(key.to_string()).or_default();

        let cutoff = now.checked_sub(self.window);
        entries.retain(|t| match cutoff {
            Some(cutoff) => *t > cutoff,
            None => true,
        });

        if entries.len() >= self.limit {
            return false;
        }

        entries.push(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_limit() {
        let limiter = SlidingWindowLimiter::new(3, Duration::from_secs(60));
        let now = Instant::now();

        assert!(limiter.allow_at("10.0.0.1", now));
        assert!(limiter.allow_at("10.0.0.1", now));
        assert!(limiter.allow_at("10.0.0.1", now));
        assert!(!limiter.allow_at("10.0.0.1", now));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();

        assert!(limiter.allow_at("a", now));
        assert!(!limiter.allow_at("a", now));
        assert!(limiter.allow_at("b", now));
    }

    #[test]
    fn window_slides_open_again() {
        let limiter = SlidingWindowLimiter::new(2, Duration::from_secs(60));
        let start = Instant::now();

        assert!(limiter.allow_at("ws", start));
        assert!(limiter.allow_at("ws", start));
        assert!(!limiter.allow_at("ws", start));

        let later = start + Duration::from_secs(61);
        assert!(limiter.allow_at("ws", later));
    }
}
