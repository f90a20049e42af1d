//! Position-Aware Cache
//!
//! Layer over [`TtlCache`] for per-token API data. Adds:
//! - per-data-type TTL, priority and auto-refresh policy
//! - longer TTLs for tracked tokens (x1.2) and held positions (x2)
//! - refresh hints when a position's auto-refresh data is about to expire
//! - hit/miss counters and an estimated API-cost saving
//!
//! The cache never calls an API itself. Refresh hints are queued for the
//! caller, who owns the connector needed to re-fetch.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::ttl::TtlCache;
use crate::config::CacheSettings;
use crate::config::ConfigError;
use crate::domain::priority::{default_data_types, DataTypeConfig};
use crate::domain::tracked_tokens::{TokenMembership, TrackedTokenRegistry};

/// Remaining-TTL fraction under which a position gets a refresh hint
pub const REFRESH_THRESHOLD: f64 = 0.25;

/// Composite cache key: `data_type:token[:extra_key]`
pub fn cache_key(data_type: &str, token_address: &str, extra_key: &str) -> String {
    if extra_key.is_empty() {
        format!("{}:{}", data_type, token_address)
    } else {
        format!("{}:{}:{}", data_type, token_address, extra_key)
    }
}

/// Request to re-fetch a position's data before it expires
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshHint {
    pub data_type: String,
    pub token_address: String,
    pub extra_key: String,
    /// TTL left when the hint was raised
    pub remaining: Duration,
}

#[derive(Debug, Default)]
struct RefreshQueue {
    hints: VecDeque<(String, RefreshHint)>,
    pending: HashSet<String>,
}

impl RefreshQueue {
    fn push(&mut self, key: String, hint: RefreshHint) -> bool {
        if !self.pending.insert(key.clone()) {
            return false;
        }
        self.hints.push_back((key, hint));
        true
    }

    fn cancel(&mut self, key: &str) {
        if self.pending.remove(key) {
            self.hints.retain(|(pending_key, _)| pending_key != key);
        }
    }

    fn drain(&mut self) -> Vec<RefreshHint> {
        self.pending.clear();
        self.hints.drain(..).map(|(_, hint)| hint).collect()
    }
}

/// Running counters since the last reset
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatistics {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate_percent: f64,
    /// Σ hits × per-data-type cost weight. A rough estimate only.
    pub estimated_savings: f64,
    pub pending_refreshes: usize,
    pub entries: usize,
    pub since: DateTime<Utc>,
}

/// TTL cache with tracked-token awareness
#[derive(Debug)]
pub struct PositionAwareCache {
    store: Arc<TtlCache>,
    registry: TrackedTokenRegistry,
    data_types: HashMap<String, DataTypeConfig>,
    fallback: DataTypeConfig,
    /// Every key written per token, so unregistering can invalidate them all
    token_keys: DashMap<String, HashSet<String>>,
    hits: AtomicU64,
    misses: AtomicU64,
    hits_by_type: DashMap<String, u64>,
    refresh_queue: Mutex<RefreshQueue>,
    stats_since: RwLock<DateTime<Utc>>,
}

impl PositionAwareCache {
    /// Cache with the built-in data types
    pub fn new(store: Arc<TtlCache>) -> Self {
        Self::with_data_types(store, default_data_types())
    }

    pub fn with_data_types(store: Arc<TtlCache>, data_types: HashMap<String, DataTypeConfig>) -> Self {
        Self {
            store,
            registry: TrackedTokenRegistry::new(),
            data_types,
            fallback: DataTypeConfig::fallback(),
            token_keys: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            hits_by_type: DashMap::new(),
            refresh_queue: Mutex::new(RefreshQueue::default()),
            stats_since: RwLock::new(Utc::now()),
        }
    }

    /// Build from the `[cache]` config section
    pub fn from_settings(settings: &CacheSettings) -> Result<Self, ConfigError> {
        let store = Arc::new(TtlCache::with_default_ttl(settings.default_ttl()?));
        Ok(Self::with_data_types(store, settings.data_type_configs()?))
    }

    /// Add or replace a data-type policy
    pub fn with_data_type(mut self, name: impl Into<String>, config: DataTypeConfig) -> Self {
        self.data_types.insert(name.into(), config);
        self
    }

    /// Replace the policy used for unknown data types
    pub fn with_fallback(mut self, fallback: DataTypeConfig) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn store(&self) -> &Arc<TtlCache> {
        &self.store
    }

    pub fn registry(&self) -> &TrackedTokenRegistry {
        &self.registry
    }

    /// Policy for a data type, falling back to the conservative default
    pub fn data_type_config(&self, data_type: &str) -> DataTypeConfig {
        self.data_types
            .get(data_type)
            .copied()
            .unwrap_or(self.fallback)
    }

    /// Sorted names of configured data types
    pub fn data_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.data_types.keys().cloned().collect();
        names.sort();
        names
    }

    /// TTL `set_enhanced` would use for this token right now
    pub fn effective_ttl(&self, data_type: &str, token_address: &str) -> Duration {
        let base = self.data_type_config(data_type).ttl;
        let factor = self.registry.membership(token_address).ttl_factor();
        Duration::try_from_secs_f64(base.as_secs_f64() * factor).unwrap_or(Duration::MAX)
    }

    // =========================================================================
    // Plain key access (counted in statistics)
    // =========================================================================

    /// Base-cache lookup that still feeds the hit/miss counters
    pub fn get(&self, key: &str) -> Option<Value> {
        let value = self.store.get(key);
        match value {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        value
    }

    pub fn set(&self, key: impl Into<String>, value: Value, ttl: Duration) {
        self.store.set(key, value, ttl);
    }

    pub fn delete(&self, key: &str) -> bool {
        self.store.delete(key)
    }

    // =========================================================================
    // Token-aware access
    // =========================================================================

    /// Look up token data; may queue a refresh hint on hit
    pub fn get_enhanced(&self, data_type: &str, token_address: &str, extra_key: &str) -> Option<Value> {
        let key = cache_key(data_type, token_address, extra_key);

        let Some((value, remaining)) = self.store.get_with_remaining_ttl(&key) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };

        self.hits.fetch_add(1, Ordering::Relaxed);
        *self.hits_by_type.entry(data_type.to_string()).or_insert(0) += 1;
        self.maybe_queue_refresh(data_type, token_address, extra_key, key, remaining);

        Some(value)
    }

    fn maybe_queue_refresh(
        &self,
        data_type: &str,
        token_address: &str,
        extra_key: &str,
        key: String,
        remaining: Duration,
    ) {
        let config = self.data_type_config(data_type);
        if !config.auto_refresh || !self.registry.is_position(token_address) {
            return;
        }

        if remaining.as_secs_f64() >= config.ttl.as_secs_f64() * REFRESH_THRESHOLD {
            return;
        }

        let hint = RefreshHint {
            data_type: data_type.to_string(),
            token_address: token_address.to_string(),
            extra_key: extra_key.to_string(),
            remaining,
        };
        if self.refresh_queue.lock().push(key, hint) {
            tracing::debug!(
                data_type,
                token = token_address,
                remaining_ms = remaining.as_millis() as u64,
                "Queued refresh hint for position data"
            );
        }
    }

    /// Store token data with the data type's TTL scaled by token membership
    pub fn set_enhanced(&self, data_type: &str, token_address: &str, value: Value, extra_key: &str) {
        let config = self.data_type_config(data_type);
        let ttl = self.effective_ttl(data_type, token_address);
        let key = cache_key(data_type, token_address, extra_key);

        self.store
            .set_with_priority(key.clone(), value, ttl, config.priority);
        self.token_keys
            .entry(token_address.to_string())
            .or_default()
            .insert(key.clone());
        // Fresh data satisfies any pending hint for this key
        self.refresh_queue.lock().cancel(&key);
    }

    /// Per-item `get_enhanced`; only hits appear in the result
    pub fn batch_get_enhanced<S: AsRef<str>>(
        &self,
        data_type: &str,
        token_addresses: &[S],
        extra_key: &str,
    ) -> HashMap<String, Value> {
        token_addresses
            .iter()
            .filter_map(|token| {
                let token = token.as_ref();
                self.get_enhanced(data_type, token, extra_key)
                    .map(|value| (token.to_string(), value))
            })
            .collect()
    }

    /// Per-item `set_enhanced`; returns how many items were written
    pub fn batch_set_enhanced<I>(&self, data_type: &str, items: I, extra_key: &str) -> usize
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut written = 0;
        for (token, value) in items {
            self.set_enhanced(data_type, &token, value, extra_key);
            written += 1;
        }
        written
    }

    /// Sweep expired entries and forget index keys that no longer hold data
    ///
    /// Returns how many cache entries were removed.
    pub fn purge_expired(&self) -> usize {
        let removed = self.store.purge_expired();
        self.token_keys.retain(|_, keys| {
            keys.retain(|key| self.store.contains(key));
            !keys.is_empty()
        });
        removed
    }

    /// Tokens with at least one indexed key
    pub fn indexed_tokens(&self) -> usize {
        self.token_keys.len()
    }

    // =========================================================================
    // Tracked tokens
    // =========================================================================

    pub fn register_tracked_token(&self, address: &str, is_position: bool) {
        self.registry.register(address, is_position);
        tracing::info!(token = address, is_position, "Registered tracked token");
    }

    /// Stop tracking a token and drop all of its cached data
    ///
    /// Returns the number of cache entries invalidated.
    pub fn unregister_tracked_token(&self, address: &str) -> usize {
        self.registry.unregister(address);

        let mut keys = self
            .token_keys
            .remove(address)
            .map(|(_, keys)| keys)
            .unwrap_or_default();
        // Entries stored under the same scheme without going through set_enhanced
        for data_type in self.data_types.keys() {
            keys.insert(cache_key(data_type, address, ""));
        }

        let mut invalidated = 0;
        {
            let mut queue = self.refresh_queue.lock();
            for key in &keys {
                queue.cancel(key);
            }
        }
        for key in &keys {
            if self.store.delete(key) {
                invalidated += 1;
            }
        }

        tracing::info!(token = address, invalidated, "Unregistered tracked token");
        invalidated
    }

    pub fn is_position(&self, address: &str) -> bool {
        self.registry.is_position(address)
    }

    pub fn is_tracked(&self, address: &str) -> bool {
        self.registry.is_tracked(address)
    }

    pub fn membership(&self, address: &str) -> TokenMembership {
        self.registry.membership(address)
    }

    // =========================================================================
    // Refresh hints and statistics
    // =========================================================================

    /// Take every queued refresh hint, oldest first
    pub fn drain_refresh_hints(&self) -> Vec<RefreshHint> {
        self.refresh_queue.lock().drain()
    }

    pub fn pending_refreshes(&self) -> usize {
        self.refresh_queue.lock().hints.len()
    }

    pub fn statistics(&self) -> CacheStatistics {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate_percent = if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64 * 100.0
        };

        let estimated_savings = self
            .hits_by_type
            .iter()
            .map(|entry| *entry.value() as f64 * self.data_type_config(entry.key()).cost_weight)
            .sum();

        CacheStatistics {
            hits,
            misses,
            hit_rate_percent,
            estimated_savings,
            pending_refreshes: self.pending_refreshes(),
            entries: self.store.len(),
            since: *self.stats_since.read(),
        }
    }

    pub fn reset_statistics(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.hits_by_type.clear();
        *self.stats_since.write() = Utc::now();
    }
}
