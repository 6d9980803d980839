//! Hysteresis grace timers
//!
//! A grace timer holds a previously higher score for one URL while the cursor
//! settles. At most one timer exists per URL and an active timer is never
//! renewed or extended.

use crate::types::Millis;
use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
pub struct GraceTimers {
    expires_at: HashMap<String, Millis>,
}

impl GraceTimers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self, url: &str, now: Millis) -> bool {
        self.expires_at.get(url).is_some_and(|expiry| now < *expiry)
    }

    /// Start a timer for `url`. Returns false (and changes nothing) if one is
    /// already running.
    pub fn start(&mut self, url: &str, now: Millis, duration: Millis) -> bool {
        if self.is_active(url, now) {
            return false;
        }
        self.expires_at.insert(url.to_string(), now + duration);
        true
    }

    /// Expiry of the running timer for `url`, if any
    pub fn expiry(&self, url: &str, now: Millis) -> Option<Millis> {
        self.expires_at.get(url).copied().filter(|expiry| now < *expiry)
    }

    /// Drop expired timers
    pub fn sweep(&mut self, now: Millis) {
        self.expires_at.retain(|_, expiry| now < *expiry);
    }

    /// Number of timers still running at `now`
    pub fn active_count(&self, now: Millis) -> usize {
        self.expires_at.values().filter(|expiry| now < **expiry).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_trigger_does_not_extend() {
        let mut timers = GraceTimers::new();
        assert!(timers.start("https://a.com/", 0.0, 200.0));
        assert!(!timers.start("https://a.com/", 150.0, 200.0));
        assert_eq!(timers.expiry("https://a.com/", 150.0), Some(200.0));
        assert_eq!(timers.active_count(150.0), 1);
    }

    #[test]
    fn test_timer_expires() {
        let mut timers = GraceTimers::new();
        timers.start("https://a.com/", 0.0, 200.0);
        assert!(timers.is_active("https://a.com/", 199.0));
        assert!(!timers.is_active("https://a.com/", 200.0));
        assert!(timers.start("https://a.com/", 250.0, 200.0));
        assert_eq!(timers.expiry("https://a.com/", 250.0), Some(450.0));
    }

    #[test]
    fn test_sweep_removes_expired() {
        let mut timers = GraceTimers::new();
        timers.start("https://a.com/1", 0.0, 100.0);
        timers.start("https://a.com/2", 0.0, 300.0);
        timers.sweep(200.0);
        assert_eq!(timers.active_count(200.0), 1);
        assert!(timers.is_active("https://a.com/2", 200.0));
    }
}
