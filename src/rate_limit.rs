//! Fixed-window request limiting per client address.
//!
//! The first request from a key opens a window; every admitted request in
//! that window increments its counter. Once the counter reaches the limit,
//! further requests are rejected (and not counted) until the window,
//! measured from its first request, has elapsed.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;

/// Table size above which expired windows are swept on the next check.
const SWEEP_THRESHOLD: usize = 1024;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Outcome of a rejected check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimited {
    /// Time until the key's window resets.
    pub retry_after: Duration,
}

pub struct FixedWindowLimiter {
    limit: u32,
    window: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

impl FixedWindowLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.limit, Duration::from_secs(config.window_secs))
    }

    /// Count a request from `key` now.
    pub fn check(&self, key: &str) -> Result<(), RateLimited> {
        self.check_at(key, Instant::now())
    }

    /// Count a request from `key` at `now`. Increment and compare happen
    /// under one lock, so concurrent requests from a key cannot overshoot.
    pub fn check_at(&self, key: &str, now: Instant) -> Result<(), RateLimited> {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());

        if windows.len() > SWEEP_THRESHOLD {
            let window = self.window;
            windows.retain(|_, w| now.saturating_duration_since(w.started) < window);
        }

        let entry = windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });

        let elapsed = now.saturating_duration_since(entry.started);
        if elapsed >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }

        if entry.count >= self.limit {
            return Err(RateLimited {
                retry_after: self.window.saturating_sub(now.saturating_duration_since(entry.started)),
            });
        }

        entry.count += 1;
        Ok(())
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.windows.lock().map(|w| w.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> FixedWindowLimiter {
        FixedWindowLimiter::new(10, Duration::from_secs(60))
    }

    #[test]
    fn test_eleventh_request_rejected() {
        let rl = limiter();
        let t0 = Instant::now();
        for i in 0..10 {
            assert!(rl.check_at("10.0.0.1", t0 + Duration::from_secs(i)).is_ok());
        }
        let err = rl.check_at("10.0.0.1", t0 + Duration::from_secs(30)).unwrap_err();
        assert_eq!(err.retry_after, Duration::from_secs(30));
    }

    #[test]
    fn test_window_resets_after_sixty_seconds_from_first_request() {
        let rl = limiter();
        let t0 = Instant::now();
        for _ in 0..10 {
            rl.check_at("10.0.0.1", t0).unwrap();
        }
        assert!(rl.check_at("10.0.0.1", t0 + Duration::from_secs(59)).is_err());
        assert!(rl.check_at("10.0.0.1", t0 + Duration::from_secs(60)).is_ok());
        // new window counts from its own first request
        for _ in 0..9 {
            rl.check_at("10.0.0.1", t0 + Duration::from_secs(61)).unwrap();
        }
        assert!(rl.check_at("10.0.0.1", t0 + Duration::from_secs(62)).is_err());
    }

    #[test]
    fn test_rejections_do_not_extend_window() {
        let rl = limiter();
        let t0 = Instant::now();
        for _ in 0..10 {
            rl.check_at("k", t0).unwrap();
        }
        for s in 1..60 {
            assert!(rl.check_at("k", t0 + Duration::from_secs(s)).is_err());
        }
        assert!(rl.check_at("k", t0 + Duration::from_secs(60)).is_ok());
    }

    #[test]
    fn test_keys_are_independent() {
        let rl = limiter();
        let t0 = Instant::now();
        for _ in 0..10 {
            rl.check_at("a", t0).unwrap();
        }
        assert!(rl.check_at("a", t0).is_err());
        assert!(rl.check_at("b", t0).is_ok());
    }

    #[test]
    fn test_expired_windows_swept() {
        let rl = FixedWindowLimiter::new(1, Duration::from_secs(1));
        let t0 = Instant::now();
        for i in 0..=SWEEP_THRESHOLD {
            rl.check_at(&format!("client-{}", i), t0).unwrap();
        }
        assert_eq!(rl.tracked_keys(), SWEEP_THRESHOLD + 1);
        rl.check_at("late", t0 + Duration::from_secs(5)).unwrap();
        assert_eq!(rl.tracked_keys(), 1);
    }

    #[test]
    fn test_concurrent_checks_never_exceed_limit() {
        let rl = std::sync::Arc::new(limiter());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let rl = rl.clone();
                std::thread::spawn(move || (0..5).filter(|_| rl.check("shared").is_ok()).count())
            })
            .collect();
        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 10);
    }
}
