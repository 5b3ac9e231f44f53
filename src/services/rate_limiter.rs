//! Login rate limiting
//!
//! Two sliding windows guard the login endpoint:
//! - failed attempts per email: 5 per 15 minutes
//! - login requests per client IP: 10 per minute

use std::collections::HashMap;
use std::hash::Hash;
use std::net::IpAddr;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Counts events per key inside a trailing time window
pub struct SlidingWindow<K> {
    limit: usize,
    window: Duration,
    events: Mutex<HashMap<K, Vec<Instant>>>,
}

impl<K: Eq + Hash> SlidingWindow<K> {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            events: Mutex::new(HashMap::new()),
        }
    }

    /// True once `limit` events are inside the window
    pub async fn is_exhausted(&self, key: &K) -> bool {
        let mut events = self.events.lock().await;
        match events.get_mut(key) {
            Some(times) => {
                prune(times, self.window);
                times.len() >= self.limit
            }
            None => false,
        }
    }

    pub async fn record(&self, key: K) {
        let mut events = self.events.lock().await;
        let times = events.entry(key).or_default();
        prune(times, self.window);
        times.push(Instant::now());
    }

    /// Record an event unless the window is already full. Returns whether
    /// the event was admitted.
    pub async fn try_acquire(&self, key: K) -> bool {
        let mut events = self.events.lock().await;
        let times = events.entry(key).or_default();
        prune(times, self.window);
        if times.len() >= self.limit {
            return false;
        }
        times.push(Instant::now());
        true
    }

    pub async fn reset(&self, key: &K) {
        self.events.lock().await.remove(key);
    }

    /// Drop keys with no events left in the window
    pub async fn cleanup(&self) -> usize {
        let mut events = self.events.lock().await;
        let before = events.len();
        events.retain(|_, times| {
            prune(times, self.window);
            !times.is_empty()
        });
        before - events.len()
    }

    pub async fn tracked_keys(&self) -> usize {
        self.events.lock().await.len()
    }
}

fn prune(times: &mut Vec<Instant>, window: Duration) {
    let now = Instant::now();
    times.retain(|t| now.duration_since(*t) < window);
}

pub struct LoginRateLimiter {
    failures_by_email: SlidingWindow<String>,
    requests_by_ip: SlidingWindow<IpAddr>,
}

impl LoginRateLimiter {
    pub fn new() -> Self {
        Self::with_limits(
            (5, Duration::from_secs(15 * 60)),
            (10, Duration::from_secs(60)),
        )
    }

    /// `(limit, window)` pairs for the email and IP windows
    pub fn with_limits(email: (usize, Duration), ip: (usize, Duration)) -> Self {
        Self {
            failures_by_email: SlidingWindow::new(email.0, email.1),
            requests_by_ip: SlidingWindow::new(ip.0, ip.1),
        }
    }

    /// Count a login request from `ip`; false when the IP is over its limit
    pub async fn allow_request(&self, ip: IpAddr) -> bool {
        self.requests_by_ip.try_acquire(ip).await
    }

    pub async fn is_email_locked(&self, email: &str) -> bool {
        self.failures_by_email.is_exhausted(&normalize(email)).await
    }

    pub async fn record_failure(&self, email: &str) {
        self.failures_by_email.record(normalize(email)).await;
    }

    /// Forget failures after a successful login
    pub async fn clear_failures(&self, email: &str) {
        self.failures_by_email.reset(&normalize(email)).await;
    }

    pub async fn cleanup(&self) {
        let emails = self.failures_by_email.cleanup().await;
        let ips = self.requests_by_ip.cleanup().await;
        if emails + ips > 0 {
            tracing::debug!(emails, ips, "pruned idle rate limit entries");
        }
    }
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(email: &str) -> String {
    email.trim().to_lowercase()
}
