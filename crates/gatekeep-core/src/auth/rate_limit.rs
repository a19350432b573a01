use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;

/// Sliding-window cap on login attempts per email.
pub struct LoginRateLimiter {
    max_attempts: usize,
    window: Duration,
    attempts: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl LoginRateLimiter {
    pub fn new(max_attempts: usize, window: Duration) -> Self {
        Self {
            max_attempts,
            window,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Record an attempt for `email`. Returns false, without recording,
    /// when the window is already full.
    pub fn try_acquire(&self, email: &str) -> bool {
        if self.max_attempts == 0 {
            return true;
        }

        let now = Instant::now();
        let mut attempts = self.attempts.lock().unwrap_or_else(PoisonError::into_inner);
        attempts.retain(|_, times| {
            prune(times, now, self.window);
            !times.is_empty()
        });

        let times = attempts.entry(email.to_string()).or_default();
        if times.len() >= self.max_attempts {
            warn!(%email, attempts = times.len(), "Login rate limit reached");
            return false;
        }
        times.push_back(now);
        true
    }

    /// Forget attempts for `email`, e.g. after a successful login
    pub fn reset(&self, email: &str) {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(email);
    }
}

fn prune(times: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while times
        .front()
        .is_some_and(|t| now.duration_since(*t) >= window)
    {
        times.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_blocks_after_max_attempts() {
        let limiter = LoginRateLimiter::new(5, Duration::from_secs(60));
        for _ in 0..5 {
            assert!(limiter.try_acquire("ada@example.com"));
        }
        assert!(!limiter.try_acquire("ada@example.com"));
        // Other emails are unaffected
        assert!(limiter.try_acquire("bob@example.com"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_slides() {
        let limiter = LoginRateLimiter::new(2, Duration::from_secs(60));
        assert!(limiter.try_acquire("a"));
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(limiter.try_acquire("a"));
        assert!(!limiter.try_acquire("a"));

        tokio::time::advance(Duration::from_secs(30)).await;
        // First attempt has aged out
        assert!(limiter.try_acquire("a"));
        assert!(!limiter.try_acquire("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_clears_attempts() {
        let limiter = LoginRateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.try_acquire("a"));
        assert!(!limiter.try_acquire("a"));
        limiter.reset("a");
        assert!(limiter.try_acquire("a"));
    }

    #[test]
    fn test_zero_disables_limit() {
        let limiter = LoginRateLimiter::new(0, Duration::from_secs(60));
        for _ in 0..100 {
            assert!(limiter.try_acquire("a"));
        }
    }
}
