//! Service Wiring
//!
//! Builds the process-wide limiter, cache and gateway from `Config` and hands
//! every configured API a `CachedSource` sharing them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

use super::cached_source::CachedSource;
use super::gateway::ApiGateway;
use crate::adapters::http::{JsonApiClient, JsonApiConfig};
use crate::cache::PositionAwareCache;
use crate::config::{Config, ConfigError};
use crate::limiter::{RateLimitConfigError, RateLimiter};
use crate::ports::json_source::{JsonSource, SourceError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid rate limit: {0}")]
    RateLimit(#[from] RateLimitConfigError),

    #[error("Failed to build '{name}' client: {source}")]
    Client {
        name: String,
        #[source]
        source: SourceError,
    },
}

/// Shared components for one process
#[derive(Debug)]
pub struct Services {
    pub limiter: Arc<RateLimiter>,
    pub cache: Arc<PositionAwareCache>,
    pub gateway: Arc<ApiGateway>,
    sources: HashMap<String, CachedSource>,
}

impl Services {
    /// Limiter, cache and gateway without any API sources
    pub fn core(config: &Config) -> Result<Self, ServiceError> {
        let limiter = Arc::new(RateLimiter::from_settings(&config.rate_limiter)?);
        let cache = Arc::new(PositionAwareCache::from_settings(&config.cache)?);
        let gateway = Arc::new(ApiGateway::new(Arc::clone(&limiter), Arc::clone(&cache)));

        Ok(Self {
            limiter,
            cache,
            gateway,
            sources: HashMap::new(),
        })
    }

    /// Core components plus an HTTP-backed source for every `[apis.*]` entry
    pub fn from_config(config: &Config) -> Result<Self, ServiceError> {
        let mut services = Self::core(config)?;
        let default_ttl = config.cache.default_ttl()?;

        for (name, section) in &config.apis {
            let client = JsonApiClient::with_config(JsonApiConfig::from_section(name, section))
                .map_err(|source| ServiceError::Client {
                    name: name.clone(),
                    source,
                })?;
            let ttl = section.cache_ttl(name)?.unwrap_or(default_ttl);

            let domain = section.domain_or(name);
            if services.limiter.config_for(domain).is_none() {
                tracing::warn!(api = %name, domain, "API has no rate limit configured");
            }

            services.add_source(name.clone(), domain, ttl, Arc::new(client));
        }

        tracing::info!(
            apis = services.sources.len(),
            limiter_enabled = services.limiter.is_enabled(),
            "Services initialized"
        );
        Ok(services)
    }

    /// Register a source under `name`, replacing any previous one
    pub fn add_source(
        &mut self,
        name: impl Into<String>,
        domain: &str,
        ttl: Duration,
        source: Arc<dyn JsonSource>,
    ) -> &CachedSource {
        let name = name.into();
        let cached = CachedSource::new(name.clone(), domain, ttl, source, Arc::clone(&self.gateway));
        self.sources.insert(name.clone(), cached);
        &self.sources[&name]
    }

    pub fn source(&self, name: &str) -> Option<&CachedSource> {
        self.sources.get(name)
    }

    /// Sorted source names
    pub fn source_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sources.keys().cloned().collect();
        names.sort();
        names
    }

    /// Periodically purge expired cache entries
    ///
    /// Reads already treat expired entries as absent; this only reclaims
    /// memory held by keys nobody reads again, including the per-token index.
    pub fn spawn_cache_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let cache = Arc::clone(&self.cache);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                cache.purge_expired();
            }
        })
    }
}
