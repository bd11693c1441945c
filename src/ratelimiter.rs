//! Process-wide keyed sliding-window rate limiter.
//!
//! Safe for concurrent callers; this is the one genuinely global keyed
//! store, exposing only atomic operations through a single
//! `Arc<Mutex<...>>` guard.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy)]
struct WindowConfig {
    max_requests: u32,
    window: Duration,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            max_requests: 60,
            window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
struct Window {
    config: WindowConfig,
    window_start: Instant,
    admissions: u32,
}

impl Window {
    fn new(config: WindowConfig) -> Self {
        Self {
            config,
            window_start: Instant::now(),
            admissions: 0,
        }
    }

    fn refresh(&mut self, now: Instant) {
        if now.duration_since(self.window_start) >= self.config.window {
            self.window_start = now;
            self.admissions = 0;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub remaining: u32,
    pub reset_at_ms: u64,
}

/// Per-key sliding-window admission limiter.
#[derive(Debug, Clone, Default)]
pub struct RateLimiter {
    windows: Arc<Mutex<HashMap<String, Window>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure `key` with a custom window. Resets any existing counter
    /// for that key.
    pub fn configure(&self, key: impl Into<String>, max_requests: u32, window_ms: u64) {
        let mut windows = self.windows.lock().expect("rate limiter lock poisoned");
        windows.insert(
            key.into(),
            Window::new(WindowConfig {
                max_requests,
                window: Duration::from_millis(window_ms),
            }),
        );
    }

    /// Admit a request for `key`, or fail with `rate_limited`.
    pub fn allow_request(&self, key: &str) -> Result<()> {
        let mut windows = self.windows.lock().expect("rate limiter lock poisoned");
        let now = Instant::now();
        let window = windows
            .entry(key.to_string())
            .or_insert_with(|| Window::new(WindowConfig::default()));
        window.refresh(now);
        if window.admissions < window.config.max_requests {
            window.admissions += 1;
            Ok(())
        } else {
            Err(Error::rate_limited(key))
        }
    }

    pub fn reset(&self, key: &str) {
        let mut windows = self.windows.lock().expect("rate limiter lock poisoned");
        if let Some(window) = windows.get_mut(key) {
            window.window_start = Instant::now();
            window.admissions = 0;
        }
    }

    pub fn status(&self, key: &str) -> RateLimitStatus {
        let mut windows = self.windows.lock().expect("rate limiter lock poisoned");
        let now = Instant::now();
        let window = windows
            .entry(key.to_string())
            .or_insert_with(|| Window::new(WindowConfig::default()));
        window.refresh(now);
        let remaining = window.config.max_requests.saturating_sub(window.admissions);
        let reset_at = window.window_start + window.config.window;
        let reset_at_ms = reset_at.saturating_duration_since(now).as_millis() as u64;
        RateLimitStatus {
            remaining,
            reset_at_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_configured_max_then_rejects() {
        let limiter = RateLimiter::new();
        limiter.configure("a", 3, 60_000);
        assert!(limiter.allow_request("a").is_ok());
        assert!(limiter.allow_request("a").is_ok());
        assert!(limiter.allow_request("a").is_ok());
        assert!(limiter.allow_request("a").is_err());
    }

    #[test]
    fn keys_are_independent() {
        let limiter = RateLimiter::new();
        limiter.configure("a", 1, 60_000);
        limiter.configure("b", 1, 60_000);
        assert!(limiter.allow_request("a").is_ok());
        assert!(limiter.allow_request("b").is_ok());
        assert!(limiter.allow_request("a").is_err());
    }

    #[test]
    fn reset_clears_the_window() {
        let limiter = RateLimiter::new();
        limiter.configure("a", 1, 60_000);
        assert!(limiter.allow_request("a").is_ok());
        assert!(limiter.allow_request("a").is_err());
        limiter.reset("a");
        assert!(limiter.allow_request("a").is_ok());
    }

    #[test]
    fn status_reports_remaining() {
        let limiter = RateLimiter::new();
        limiter.configure("a", 5, 60_000);
        limiter.allow_request("a").unwrap();
        let status = limiter.status("a");
        assert_eq!(status.remaining, 4);
    }
}
