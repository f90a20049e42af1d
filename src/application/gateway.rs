//! API Gateway
//!
//! The read path every connector call goes through:
//! cache lookup → rate-limit slot → origin call → cache write.

use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::cache::PositionAwareCache;
use crate::limiter::{LimiterError, RateLimiter};

/// Failure of a gateway fetch
///
/// Origin errors are passed through untouched and never cached.
#[derive(Debug, Error)]
pub enum GatewayError<E> {
    #[error("Origin call failed: {0}")]
    Origin(E),

    #[error(transparent)]
    RateLimitTimeout(#[from] LimiterError),
}

impl<E> GatewayError<E> {
    pub fn origin(&self) -> Option<&E> {
        match self {
            GatewayError::Origin(e) => Some(e),
            GatewayError::RateLimitTimeout(_) => None,
        }
    }
}

/// Shared limiter + cache in front of origin calls
#[derive(Debug, Clone)]
pub struct ApiGateway {
    limiter: Arc<RateLimiter>,
    cache: Arc<PositionAwareCache>,
    acquire_timeout: Option<Duration>,
}

impl ApiGateway {
    pub fn new(limiter: Arc<RateLimiter>, cache: Arc<PositionAwareCache>) -> Self {
        Self {
            limiter,
            cache,
            acquire_timeout: None,
        }
    }

    /// Give up on a rate-limit slot after `timeout` instead of waiting forever
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn cache(&self) -> &Arc<PositionAwareCache> {
        &self.cache
    }

    async fn acquire(&self, domain: &str) -> Result<(), LimiterError> {
        match self.acquire_timeout {
            Some(timeout) => self.limiter.acquire_within(domain, timeout).await,
            None => {
                self.limiter.acquire(domain).await;
                Ok(())
            }
        }
    }

    /// Cached, rate-limited fetch under a plain cache key
    pub async fn fetch<F, Fut, E>(
        &self,
        domain: &str,
        key: &str,
        ttl: Duration,
        origin: F,
    ) -> Result<Value, GatewayError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, E>>,
    {
        if let Some(value) = self.cache.get(key) {
            tracing::trace!(key, "Cache hit");
            return Ok(value);
        }

        self.acquire(domain).await?;
        let value = origin().await.map_err(GatewayError::Origin)?;
        self.cache.set(key, value.clone(), ttl);
        Ok(value)
    }

    /// Cached, rate-limited fetch of per-token data
    ///
    /// TTL comes from the data type and the token's tracked/position status.
    pub async fn fetch_token<F, Fut, E>(
        &self,
        domain: &str,
        data_type: &str,
        token_address: &str,
        extra_key: &str,
        origin: F,
    ) -> Result<Value, GatewayError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, E>>,
    {
        if let Some(value) = self.cache.get_enhanced(data_type, token_address, extra_key) {
            return Ok(value);
        }

        self.acquire(domain).await?;
        let value = origin().await.map_err(GatewayError::Origin)?;
        self.cache
            .set_enhanced(data_type, token_address, value.clone(), extra_key);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TtlCache;
    use crate::limiter::RateLimitConfig;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    fn gateway(max_calls: u32) -> ApiGateway {
        let limiter = RateLimiter::new();
        limiter.configure("birdeye", RateLimitConfig::per_second(max_calls).unwrap());
        let cache = PositionAwareCache::new(Arc::new(TtlCache::new()));
        ApiGateway::new(Arc::new(limiter), Arc::new(cache))
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_fetch_is_served_from_cache() {
        let gateway = gateway(5);
        let calls = AtomicUsize::new(0);
        let counter = &calls;

        for _ in 0..3 {
            let value = gateway
                .fetch("birdeye", "price:TOK", Duration::from_secs(60), || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(json!({"value": 2.5}))
                })
                .await
                .unwrap();
            assert_eq!(value["value"], json!(2.5));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(gateway.limiter().stats("birdeye").unwrap().current_count, 1);
        let stats = gateway.cache().statistics();
        assert_eq!((stats.hits, stats.misses), (2, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_origin_error_is_not_cached() {
        let gateway = gateway(5);

        let err = gateway
            .fetch("birdeye", "k", Duration::from_secs(60), || async {
                Err::<Value, _>("upstream 500".to_string())
            })
            .await
            .unwrap_err();
        assert_eq!(err.origin(), Some(&"upstream 500".to_string()));
        assert!(!gateway.cache().store().contains("k"));

        let value = gateway
            .fetch("birdeye", "k", Duration::from_secs(60), || async {
                Ok::<_, String>(json!(1))
            })
            .await
            .unwrap();
        assert_eq!(value, json!(1));
        assert!(gateway.cache().store().contains("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_misses_wait_for_rate_limit() {
        let gateway = gateway(2);
        let start = Instant::now();

        for i in 0..3 {
            let key = format!("k{}", i);
            gateway
                .fetch("birdeye", &key, Duration::from_secs(60), move || async move {
                    Ok::<_, String>(json!(i))
                })
                .await
                .unwrap();
        }

        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_timeout() {
        let gateway = gateway(1).with_acquire_timeout(Duration::from_millis(100));

        gateway
            .fetch("birdeye", "a", Duration::from_secs(60), || async {
                Ok::<_, String>(json!("a"))
            })
            .await
            .unwrap();
        let err = gateway
            .fetch("birdeye", "b", Duration::from_secs(60), || async {
                Ok::<_, String>(json!("b"))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::RateLimitTimeout(_)));
        assert!(err.origin().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_token_uses_position_ttl() {
        let gateway = gateway(5);
        gateway.cache().register_tracked_token("POS", true);

        gateway
            .fetch_token("birdeye", "token_overview", "POS", "", || async {
                Ok::<_, String>(json!({"symbol": "POS"}))
            })
            .await
            .unwrap();

        let (_, remaining) = gateway
            .cache()
            .store()
            .get_with_remaining_ttl("token_overview:POS")
            .unwrap();
        assert_eq!(remaining, Duration::from_secs(600));

        let cached = gateway
            .fetch_token("birdeye", "token_overview", "POS", "", || async {
                Err::<Value, _>("should not be called".to_string())
            })
            .await
            .unwrap();
        assert_eq!(cached["symbol"], json!("POS"));
    }
}
