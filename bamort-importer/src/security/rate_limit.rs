//! Per-user request rate limiting
//!
//! Sliding window: each user id keeps the timestamps of its admitted
//! requests inside the last `window`, and a request is rejected once that
//! count reaches `limit`. Limits for detect, import and export are separate
//! limiter instances.

use super::SecurityError;
use std::collections::{HashMap, VecDeque};
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Number of tracked users after which idle entries are dropped
const SWEEP_THRESHOLD: usize = 10_000;

/// Keyed limiter for one endpoint family
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    requests: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(limit: NonZeroU32, window: Duration) -> Self {
        Self {
            limit: limit.get() as usize,
            window,
            requests: Mutex::new(HashMap::new()),
        }
    }

    /// Admit or reject one request for `user_id`
    pub fn check(&self, user_id: &str) -> Result<(), SecurityError> {
        self.check_at(user_id, Instant::now())
    }

    fn check_at(&self, user_id: &str, now: Instant) -> Result<(), SecurityError> {
        let mut requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);

        if requests.len() > SWEEP_THRESHOLD {
            let window = self.window;
            requests.retain(|_, stamps| {
                stamps
                    .back()
                    .is_some_and(|last| now.saturating_duration_since(*last) < window)
            });
        }

        let stamps = requests.entry(user_id.to_string()).or_default();
        while stamps
            .front()
            .is_some_and(|first| now.saturating_duration_since(*first) >= self.window)
        {
            stamps.pop_front();
        }

        if stamps.len() >= self.limit {
            // Oldest admitted request leaves the window first
            let retry_after = stamps
                .front()
                .map(|first| self.window.saturating_sub(now.saturating_duration_since(*first)))
                .unwrap_or(self.window);
            return Err(SecurityError::RateLimited { retry_after });
        }

        stamps.push_back(now);
        Ok(())
    }

    #[cfg(test)]
    fn tracked_users(&self) -> usize {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Limiters for the three rate-limited endpoint families
#[derive(Clone)]
pub struct RateLimits {
    pub detect: Arc<RateLimiter>,
    pub import: Arc<RateLimiter>,
    pub export: Arc<RateLimiter>,
}

impl RateLimits {
    pub fn new(detect: NonZeroU32, import: NonZeroU32, export: NonZeroU32, window: Duration) -> Self {
        Self {
            detect: Arc::new(RateLimiter::new(detect, window)),
            import: Arc::new(RateLimiter::new(import, window)),
            export: Arc::new(RateLimiter::new(export, window)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(limit: u32) -> RateLimiter {
        RateLimiter::new(NonZeroU32::new(limit).unwrap(), Duration::from_secs(60))
    }

    #[test]
    fn test_limit_boundary() {
        let limiter = limiter(5);

        for i in 0..5 {
            assert!(limiter.check("u1").is_ok(), "request {} should pass", i + 1);
        }

        match limiter.check("u1") {
            Err(SecurityError::RateLimited { retry_after }) => {
                assert!(retry_after <= Duration::from_secs(60));
                assert!(retry_after > Duration::from_secs(59));
            }
            other => panic!("expected rate limit rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_window_slides_without_refill() {
        let limiter = limiter(2);
        let start = Instant::now();

        assert!(limiter.check_at("u1", start).is_ok());
        assert!(limiter.check_at("u1", start + Duration::from_secs(10)).is_ok());

        // Still inside the window of both admitted requests
        match limiter.check_at("u1", start + Duration::from_secs(33)) {
            Err(SecurityError::RateLimited { retry_after }) => {
                assert_eq!(retry_after, Duration::from_secs(27));
            }
            other => panic!("expected rate limit rejection, got {:?}", other),
        }
        assert!(limiter.check_at("u1", start + Duration::from_secs(59)).is_err());

        // First request has left the window, the second has not
        assert!(limiter.check_at("u1", start + Duration::from_secs(60)).is_ok());
        assert!(limiter.check_at("u1", start + Duration::from_secs(61)).is_err());
    }

    #[test]
    fn test_rejections_do_not_extend_window() {
        let limiter = limiter(1);
        let start = Instant::now();

        assert!(limiter.check_at("u1", start).is_ok());
        for secs in [1, 20, 40] {
            assert!(limiter.check_at("u1", start + Duration::from_secs(secs)).is_err());
        }
        assert!(limiter.check_at("u1", start + Duration::from_secs(60)).is_ok());
    }

    #[test]
    fn test_users_are_isolated() {
        let limiter = limiter(2);

        assert!(limiter.check("u1").is_ok());
        assert!(limiter.check("u1").is_ok());
        assert!(limiter.check("u1").is_err());

        assert!(limiter.check("u2").is_ok());
        assert!(limiter.check("u2").is_ok());
    }

    #[test]
    fn test_idle_users_are_swept() {
        let limiter = limiter(1);
        let start = Instant::now();

        for i in 0..=SWEEP_THRESHOLD {
            limiter.check_at(&format!("user-{}", i), start).unwrap();
        }
        assert_eq!(limiter.tracked_users(), SWEEP_THRESHOLD + 1);

        limiter
            .check_at("late", start + Duration::from_secs(61))
            .unwrap();
        assert_eq!(limiter.tracked_users(), 1);
    }

    #[test]
    fn test_families_are_independent() {
        let limits = RateLimits::new(
            NonZeroU32::new(1).unwrap(),
            NonZeroU32::new(1).unwrap(),
            NonZeroU32::new(1).unwrap(),
            Duration::from_secs(60),
        );

        assert!(limits.detect.check("u1").is_ok());
        assert!(limits.detect.check("u1").is_err());
        assert!(limits.import.check("u1").is_ok());
        assert!(limits.export.check("u1").is_ok());
    }
}
