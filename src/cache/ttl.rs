//! TTL Cache
//!
//! Process-local key → JSON value store with per-entry expiry. There is no
//! size-based eviction: an entry lives until its TTL runs out or it is
//! deleted. Expired entries read as absent and are purged lazily on access.

use dashmap::DashMap;
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;

use crate::domain::priority::CachePriority;

/// Default TTL when the caller does not pick one (5 minutes)
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Longest TTL accepted from configuration (10 years)
pub const MAX_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// Expiry used when `inserted_at + ttl` does not fit in an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

/// Cache entry with expiry tracking
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Value,
    pub inserted_at: Instant,
    pub expires_at: Instant,
    pub priority: CachePriority,
}

impl CacheEntry {
    pub fn new(value: Value, ttl: Duration, priority: CachePriority) -> Self {
        let inserted_at = Instant::now();
        Self {
            value,
            inserted_at,
            expires_at: inserted_at
                .checked_add(ttl)
                .unwrap_or_else(|| inserted_at + FAR_FUTURE),
            priority,
        }
    }

    /// `expires_at <= now` counts as expired
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at <= now
    }

    /// Time left before expiry, `None` once expired
    pub fn remaining_at(&self, now: Instant) -> Option<Duration> {
        if self.is_expired_at(now) {
            None
        } else {
            Some(self.expires_at - now)
        }
    }

    /// TTL the entry was stored with
    pub fn ttl(&self) -> Duration {
        self.expires_at - self.inserted_at
    }
}

/// Concurrent TTL cache
///
/// Backed by a sharded map, so writers on different keys rarely contend.
#[derive(Debug)]
pub struct TtlCache {
    entries: DashMap<String, CacheEntry>,
    default_ttl: Duration,
}

impl TtlCache {
    pub fn new() -> Self {
        Self::with_default_ttl(DEFAULT_TTL)
    }

    pub fn with_default_ttl(default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Value for `key` if present and not expired
    pub fn get(&self, key: &str) -> Option<Value> {
        self.get_with_remaining_ttl(key).map(|(value, _)| value)
    }

    /// Value plus time left before expiry
    pub fn get_with_remaining_ttl(&self, key: &str) -> Option<(Value, Duration)> {
        let now = Instant::now();
        {
            let entry = self.entries.get(key)?;
            if let Some(remaining) = entry.remaining_at(now) {
                return Some((entry.value.clone(), remaining));
            }
        }

        // Only purge if a concurrent `set` has not replaced it meanwhile
        self.entries.remove_if(key, |_, entry| entry.is_expired_at(now));
        None
    }

    /// Full entry (value, TTL, priority) if not expired
    pub fn get_entry(&self, key: &str) -> Option<CacheEntry> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired_at(now))
            .map(|entry| entry.value().clone())
    }

    /// Store with the cache default TTL
    pub fn set_default(&self, key: impl Into<String>, value: Value) {
        self.set(key, value, self.default_ttl);
    }

    /// Store with an explicit TTL, overwriting any previous entry
    ///
    /// A zero TTL is already expired: the write stores nothing and removes
    /// whatever was there.
    pub fn set(&self, key: impl Into<String>, value: Value, ttl: Duration) {
        self.set_with_priority(key, value, ttl, CachePriority::default());
    }

    pub fn set_with_priority(
        &self,
        key: impl Into<String>,
        value: Value,
        ttl: Duration,
        priority: CachePriority,
    ) {
        let key = key.into();
        if ttl.is_zero() {
            tracing::trace!(key = %key, "Zero TTL write, dropping entry");
            self.entries.remove(&key);
            return;
        }
        self.entries.insert(key, CacheEntry::new(value, ttl, priority));
    }

    /// Remove an entry; returns whether anything was stored under `key`
    pub fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Whether a live entry exists
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .get(key)
            .map_or(false, |entry| !entry.is_expired_at(now))
    }

    /// Number of stored entries, expired ones included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sweep out every expired entry; returns how many were removed
    ///
    /// Full scan, meant for periodic maintenance rather than request paths.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired_at(now));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            tracing::debug!(removed, "Purged expired cache entries");
        }
        removed
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl Default for TtlCache {
    fn default() -> Self {
        Self::new()
    }
}
