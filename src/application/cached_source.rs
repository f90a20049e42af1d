//! Cached Source
//!
//! Binds one `JsonSource` to a rate-limit domain and routes every request
//! through the shared `ApiGateway`.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::gateway::{ApiGateway, GatewayError};
use crate::ports::json_source::{JsonSource, SourceError};

/// Cache key for a GET: name, path and the query sorted by key
pub fn request_key(name: &str, path: &str, query: &[(String, String)]) -> String {
    let mut params: Vec<&(String, String)> = query.iter().collect();
    params.sort();
    let query = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    if query.is_empty() {
        format!("{}:{}", name, path)
    } else {
        format!("{}:{}?{}", name, path, query)
    }
}

/// A JSON source behind the shared limiter and cache
#[derive(Clone)]
pub struct CachedSource {
    name: String,
    domain: String,
    ttl: Duration,
    source: Arc<dyn JsonSource>,
    gateway: Arc<ApiGateway>,
}

impl std::fmt::Debug for CachedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedSource")
            .field("name", &self.name)
            .field("domain", &self.domain)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl CachedSource {
    pub fn new(
        name: impl Into<String>,
        domain: impl Into<String>,
        ttl: Duration,
        source: Arc<dyn JsonSource>,
        gateway: Arc<ApiGateway>,
    ) -> Self {
        Self {
            name: name.into(),
            domain: domain.into(),
            ttl,
            source,
            gateway,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rate-limit domain requests are counted against
    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// GET cached under the request key for this source's TTL
    pub async fn get(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<Value, GatewayError<SourceError>> {
        let key = request_key(&self.name, path, query);
        self.gateway
            .fetch(&self.domain, &key, self.ttl, || self.source.get_json(path, query))
            .await
    }

    /// GET cached as `data_type` data for one token
    ///
    /// The query string becomes the extra key, so different parameter sets
    /// for the same token and data type do not collide.
    pub async fn get_token(
        &self,
        data_type: &str,
        token_address: &str,
        path: &str,
        query: &[(String, String)],
    ) -> Result<Value, GatewayError<SourceError>> {
        let extra_key = request_key(&self.name, path, query);
        self.gateway
            .fetch_token(&self.domain, data_type, token_address, &extra_key, || {
                self.source.get_json(path, query)
            })
            .await
    }
}
