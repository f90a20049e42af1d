//! Per-Domain Rate Limiter
//!
//! Sliding-window limiter shared by every API connector. Each domain
//! ("birdeye", "jupiter", ...) has its own window behind its own mutex, so
//! callers on different domains never contend. A full window makes the caller
//! sleep until the oldest call ages out and then retry; nothing is rejected.

use dashmap::{DashMap, DashSet};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::RateLimiterSettings;
use crate::domain::rate_window::{Admission, RateLimitConfig, RateLimitConfigError, RateWindow};

/// Domain whose config applies to every domain without its own
pub const DEFAULT_DOMAIN: &str = "default";

#[derive(Debug, Error)]
pub enum LimiterError {
    #[error("Timed out after {waited:?} waiting for a '{domain}' rate-limit slot")]
    Timeout { domain: String, waited: Duration },
}

/// Read-only snapshot of one domain's window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterStats {
    pub current_count: usize,
    pub max_calls: u32,
    pub period: Duration,
}

/// Sliding-window rate limiter keyed by domain name
#[derive(Debug)]
pub struct RateLimiter {
    enabled: bool,
    configs: RwLock<HashMap<String, RateLimitConfig>>,
    windows: DashMap<String, Arc<Mutex<RateWindow>>>,
    /// Domains already warned about having no config at all
    warned: DashSet<String>,
}

impl RateLimiter {
    /// Create an enabled limiter with no domains configured
    pub fn new() -> Self {
        Self {
            enabled: true,
            configs: RwLock::new(HashMap::new()),
            windows: DashMap::new(),
            warned: DashSet::new(),
        }
    }

    /// Create a limiter whose `acquire` never waits
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new()
        }
    }

    /// Build a limiter from the `[rate_limiter]` config section
    pub fn from_settings(settings: &RateLimiterSettings) -> Result<Self, RateLimitConfigError> {
        let limiter = if settings.enabled {
            Self::new()
        } else {
            Self::disabled()
        };

        for (domain, section) in &settings.domains {
            limiter.configure(domain.clone(), section.to_limit()?);
        }

        tracing::debug!(
            enabled = settings.enabled,
            domains = settings.domains.len(),
            "Rate limiter configured"
        );
        Ok(limiter)
    }

    /// Set the limit for a domain; last write wins
    pub fn configure(&self, domain: impl Into<String>, config: RateLimitConfig) {
        let domain = domain.into();
        tracing::debug!(
            domain = %domain,
            max_calls = config.max_calls,
            period_ms = config.period.as_millis() as u64,
            "Rate limit set"
        );
        self.configs.write().insert(domain, config);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Explicitly configured domains, sorted
    pub fn domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = self.configs.read().keys().cloned().collect();
        domains.sort();
        domains
    }

    /// Effective config for a domain: its own, else the default, else none
    pub fn config_for(&self, domain: &str) -> Option<RateLimitConfig> {
        let configs = self.configs.read();
        configs
            .get(domain)
            .or_else(|| configs.get(DEFAULT_DOMAIN))
            .copied()
    }

    fn resolve(&self, domain: &str) -> Option<RateLimitConfig> {
        let config = self.config_for(domain);
        if config.is_none() && self.warned.insert(domain.to_string()) {
            tracing::warn!(
                domain,
                "No rate limit for domain and no '{}' fallback; calls are unthrottled",
                DEFAULT_DOMAIN
            );
        }
        config
    }

    fn window(&self, domain: &str) -> Arc<Mutex<RateWindow>> {
        if let Some(window) = self.windows.get(domain) {
            return Arc::clone(window.value());
        }
        Arc::clone(self.windows.entry(domain.to_string()).or_default().value())
    }

    /// Wait until a call on `domain` is allowed, then count it
    ///
    /// Never fails. The per-domain lock is only held while inspecting the
    /// window, never across the sleep. Waiters are not queued, so there is
    /// no FIFO guarantee between them.
    pub async fn acquire(&self, domain: &str) {
        if !self.enabled {
            return;
        }

        let window = self.window(domain);
        loop {
            // Re-read each round so a concurrent `configure` takes effect
            let Some(config) = self.resolve(domain) else {
                return;
            };

            let admission = {
                let mut guard = window.lock();
                guard.try_admit(&config, Instant::now())
            };

            match admission {
                Admission::Granted => return,
                Admission::Wait(wait) => {
                    tracing::trace!(
                        domain,
                        wait_ms = wait.as_millis() as u64,
                        "Rate window full, waiting"
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// `acquire`, giving up after `timeout`
    ///
    /// Dropping the pending acquire leaves the window untouched: a slot is
    /// only recorded at the instant it is granted.
    pub async fn acquire_within(&self, domain: &str, timeout: Duration) -> Result<(), LimiterError> {
        let started = Instant::now();
        tokio::time::timeout(timeout, self.acquire(domain))
            .await
            .map_err(|_| LimiterError::Timeout {
                domain: domain.to_string(),
                waited: started.elapsed(),
            })
    }

    /// Non-blocking hint: would `acquire` return right now?
    ///
    /// Reserves nothing, so the answer can be stale by the time it is used.
    pub fn check_availability(&self, domain: &str) -> bool {
        if !self.enabled {
            return true;
        }
        let Some(config) = self.config_for(domain) else {
            return true;
        };
        let Some(window) = self.windows.get(domain).map(|w| Arc::clone(w.value())) else {
            return true;
        };
        let available = window.lock().has_capacity(&config, Instant::now());
        available
    }

    /// Snapshot of a domain; `None` when the domain is unthrottled
    pub fn stats(&self, domain: &str) -> Option<LimiterStats> {
        let config = self.config_for(domain)?;
        let current_count = self
            .windows
            .get(domain)
            .map(|w| Arc::clone(w.value()))
            .map(|window| {
                let count = window.lock().count_at(config.period, Instant::now());
                count
            })
            .unwrap_or(0);

        Some(LimiterStats {
            current_count,
            max_calls: config.max_calls,
            period: config.period,
        })
    }

    /// Forget every call recorded for a domain
    pub fn reset(&self, domain: &str) {
        if let Some(window) = self.windows.get(domain).map(|w| Arc::clone(w.value())) {
            window.lock().clear();
            tracing::debug!(domain, "Rate window reset");
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready};

    fn limiter_with(domain: &str, max_calls: u32, period: Duration) -> RateLimiter {
        let limiter = RateLimiter::new();
        limiter.configure(domain, RateLimitConfig::new(max_calls, period).unwrap());
        limiter
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_within_capacity_is_immediate() {
        let limiter = limiter_with("birdeye", 3, Duration::from_secs(1));
        let start = Instant::now();

        for _ in 0..3 {
            limiter.acquire("birdeye").await;
        }

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.stats("birdeye").unwrap().current_count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_oldest_to_expire() {
        let limiter = limiter_with("birdeye", 2, Duration::from_secs(1));
        let start = Instant::now();

        limiter.acquire("birdeye").await;
        limiter.acquire("birdeye").await;
        limiter.acquire("birdeye").await;

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(1), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(1100), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_pending_until_window_slides() {
        let limiter = limiter_with("birdeye", 1, Duration::from_secs(1));
        limiter.acquire("birdeye").await;

        let mut waiter = tokio_test::task::spawn(limiter.acquire("birdeye"));
        assert_pending!(waiter.poll());

        tokio::time::advance(Duration::from_millis(999)).await;
        assert_pending!(waiter.poll());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(waiter.is_woken());
        assert_ready!(waiter.poll());
        drop(waiter);

        assert_eq!(limiter.stats("birdeye").unwrap().current_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_config_warns_once_per_domain() {
        let limiter = RateLimiter::new();

        limiter.acquire("meteora").await;
        limiter.acquire("meteora").await;
        limiter.acquire("rugcheck").await;

        assert_eq!(limiter.warned.len(), 2);
        assert!(limiter.warned.contains("meteora"));
        assert!(limiter.warned.contains("rugcheck"));

        // A domain covered by the default fallback never warns
        limiter.configure(DEFAULT_DOMAIN, RateLimitConfig::per_second(5).unwrap());
        limiter.acquire("jupiter").await;
        assert!(!limiter.warned.contains("jupiter"));
        assert_eq!(limiter.warned.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_window_blocks_until_slot_frees() {
        let limiter = limiter_with("jupiter", 1, Duration::from_secs(1));
        limiter.acquire("jupiter").await;

        let blocked =
            tokio::time::timeout(Duration::from_millis(500), limiter.acquire("jupiter")).await;
        assert!(blocked.is_err());

        let unblocked =
            tokio::time::timeout(Duration::from_millis(600), limiter.acquire("jupiter")).await;
        assert!(unblocked.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unconfigured_domain_uses_default() {
        let limiter = limiter_with(DEFAULT_DOMAIN, 2, Duration::from_secs(1));

        limiter.acquire("dexscreener").await;
        limiter.acquire("dexscreener").await;
        assert!(!limiter.check_availability("dexscreener"));

        // Separate window, same default limits
        assert!(limiter.check_availability("rugcheck"));
        let stats = limiter.stats("rugcheck").unwrap();
        assert_eq!(stats.max_calls, 2);
        assert_eq!(stats.current_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_config_at_all_is_unthrottled() {
        let limiter = RateLimiter::new();
        let start = Instant::now();

        for _ in 0..100 {
            limiter.acquire("meteora").await;
        }

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(limiter.check_availability("meteora"));
        assert!(limiter.stats("meteora").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_limiter_never_waits() {
        let limiter = RateLimiter::disabled();
        limiter.configure("birdeye", RateLimitConfig::new(1, Duration::from_secs(60)).unwrap());
        let start = Instant::now();

        for _ in 0..10 {
            limiter.acquire("birdeye").await;
        }

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(!limiter.is_enabled());
        assert!(limiter.check_availability("birdeye"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_configure_last_write_wins() {
        let limiter = limiter_with("birdeye", 1, Duration::from_secs(1));
        limiter.configure("birdeye", RateLimitConfig::new(5, Duration::from_secs(2)).unwrap());

        let stats = limiter.stats("birdeye").unwrap();
        assert_eq!(stats.max_calls, 5);
        assert_eq!(stats.period, Duration::from_secs(2));
        assert_eq!(limiter.domains(), vec!["birdeye".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_availability_does_not_reserve() {
        let limiter = limiter_with("birdeye", 1, Duration::from_secs(1));

        assert!(limiter.check_availability("birdeye"));
        assert!(limiter.check_availability("birdeye"));
        limiter.acquire("birdeye").await;
        assert!(!limiter.check_availability("birdeye"));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(limiter.check_availability("birdeye"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_clears_window() {
        let limiter = limiter_with("birdeye", 2, Duration::from_secs(10));
        limiter.acquire("birdeye").await;
        limiter.acquire("birdeye").await;
        assert!(!limiter.check_availability("birdeye"));

        limiter.reset("birdeye");

        assert!(limiter.check_availability("birdeye"));
        assert_eq!(limiter.stats("birdeye").unwrap().current_count, 0);
        // Unknown domain is a no-op
        limiter.reset("unknown");
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_within_times_out() {
        let limiter = limiter_with("birdeye", 1, Duration::from_secs(5));
        limiter.acquire("birdeye").await;

        let result = limiter.acquire_within("birdeye", Duration::from_secs(1)).await;
        match result {
            Err(LimiterError::Timeout { domain, waited }) => {
                assert_eq!(domain, "birdeye");
                assert!(waited >= Duration::from_secs(1));
            }
            other => panic!("expected timeout, got {:?}", other),
        }

        // The abandoned attempt did not take a slot
        assert_eq!(limiter.stats("birdeye").unwrap().current_count, 1);
        assert!(limiter
            .acquire_within("birdeye", Duration::from_secs(5))
            .await
            .is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_domains_are_independent() {
        let limiter = limiter_with("birdeye", 1, Duration::from_secs(60));
        limiter.configure("jupiter", RateLimitConfig::new(1, Duration::from_secs(60)).unwrap());
        let start = Instant::now();

        limiter.acquire("birdeye").await;
        limiter.acquire("jupiter").await;

        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_from_settings() {
        let mut settings = RateLimiterSettings::default();
        settings.domains.insert(
            "birdeye".to_string(),
            crate::config::DomainLimitSection { calls: 15, period: 1.0 },
        );

        let limiter = RateLimiter::from_settings(&settings).unwrap();
        assert!(limiter.is_enabled());
        assert_eq!(limiter.config_for("birdeye").unwrap().max_calls, 15);
        assert!(limiter.config_for(DEFAULT_DOMAIN).is_some());

        settings.domains.insert(
            "broken".to_string(),
            crate::config::DomainLimitSection { calls: 0, period: 1.0 },
        );
        assert!(RateLimiter::from_settings(&settings).is_err());
    }
}
