//! Sliding-window limiter for failed authentication attempts.
//!
//! Each peer address keeps the timestamps of its recent failures; further
//! attempts are refused while the window holds `max_failures` of them.
//! Successful attempts are never counted.

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct AuthRateLimiter {
    max_failures: usize,
    window: Duration,
    failures: HashMap<IpAddr, VecDeque<Instant>>,
}

impl AuthRateLimiter {
    /// `max_failures == 0` disables limiting.
    pub fn new(max_failures: usize, window: Duration) -> Self {
        Self {
            max_failures,
            window,
            failures: HashMap::new(),
        }
    }

    /// Whether `ip` must be refused without checking its token.
    pub fn is_limited(&mut self, ip: IpAddr) -> bool {
        self.is_limited_at(ip, Instant::now())
    }

    /// Count a rejected or errored attempt from `ip`.
    pub fn record_failure(&mut self, ip: IpAddr) {
        self.record_failure_at(ip, Instant::now())
    }

    fn is_limited_at(&mut self, ip: IpAddr, now: Instant) -> bool {
        if self.max_failures == 0 {
            return false;
        }
        let window = self.window;
        let Some(recent) = self.failures.get_mut(&ip) else {
            return false;
        };
        while recent
            .front()
            .is_some_and(|t| now.saturating_duration_since(*t) >= window)
        {
            recent.pop_front();
        }
        recent.len() >= self.max_failures
    }

    fn record_failure_at(&mut self, ip: IpAddr, now: Instant) {
        if self.max_failures == 0 {
            return;
        }
        self.failures.entry(ip).or_default().push_back(now);
    }

    /// Drop peers with no failure inside the window.
    pub fn gc(&mut self) {
        let now = Instant::now();
        let window = self.window;
        self.failures.retain(|_, recent| {
            recent.retain(|t| now.saturating_duration_since(*t) < window);
            !recent.is_empty()
        });
    }

    /// Number of peers currently tracked.
    pub fn tracked(&self) -> usize {
        self.failures.len()
    }
}
