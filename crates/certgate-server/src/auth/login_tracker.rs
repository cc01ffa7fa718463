//! Per-IP failed-login counter with expiry.
//!
//! Single-process, best-effort throttle. Every failure pushes the entry's
//! expiry out by an idle window, so IPs that stop failing age out of the map;
//! [`LoginAttemptTracker::expire`] re-arms it while a lockout is in force.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
struct Entry {
    count: u32,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Debug, Default)]
pub struct LoginAttemptTracker {
    entries: RwLock<HashMap<String, Entry>>,
}

impl LoginAttemptTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current failure count for `ip`, if a live entry exists.
    pub async fn get(&self, ip: &str) -> Option<u32> {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .get(ip)
            .filter(|e| e.is_live(now))
            .map(|e| e.count)
    }

    /// Replace the entry for `ip` with `count` and no expiry.
    pub async fn set(&self, ip: &str, count: u32) {
        self.entries.write().await.insert(
            ip.to_string(),
            Entry {
                count,
                expires_at: None,
            },
        );
    }

    pub async fn del(&self, ip: &str) {
        self.entries.write().await.remove(ip);
    }

    /// Arm (or re-arm) the entry's expiry. No-op if there is no entry.
    pub async fn expire(&self, ip: &str, duration: Duration) {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(ip) {
            entry.expires_at = Some(Instant::now() + duration);
        }
    }

    /// Count one failed attempt; starts at 1 when no live entry exists. The
    /// entry lives for `idle` after this failure.
    pub async fn record_failure(&self, ip: &str, idle: Duration) -> u32 {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let count = entries
            .get(ip)
            .filter(|e| e.is_live(now))
            .map_or(1, |e| e.count.saturating_add(1));
        entries.insert(
            ip.to_string(),
            Entry {
                count,
                expires_at: Some(now + idle),
            },
        );
        count
    }

    /// Drop expired entries.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        before - entries.len()
    }
}
