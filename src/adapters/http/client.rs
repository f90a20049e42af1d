//! JSON API Client
//!
//! Generic HTTP client for the token-discovery APIs (BirdEye, Jupiter,
//! DexScreener, RugCheck, Meteora). Sends GET requests, retries transient
//! failures and returns the body as untyped JSON.

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde_json::Value;
use std::time::Duration;

use crate::config::ApiSection;
use crate::ports::json_source::{JsonSource, SourceError};

/// JSON API client configuration
#[derive(Debug, Clone)]
pub struct JsonApiConfig {
    /// Short API name, used in logs
    pub name: String,
    /// Base URL, paths are appended to it
    pub base_url: String,
    /// Optional API key for higher rate limits
    pub api_key: Option<String>,
    /// Header the API key goes in
    pub api_key_header: String,
    /// Headers sent with every request
    pub default_headers: Vec<(String, String)>,
    /// Request timeout
    pub timeout: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Backoff unit for 5xx and transport errors
    pub retry_delay: Duration,
}

impl Default for JsonApiConfig {
    fn default() -> Self {
        Self {
            name: "api".to_string(),
            base_url: String::new(),
            api_key: None,
            api_key_header: "x-api-key".to_string(),
            default_headers: Vec::new(),
            timeout: Duration::from_secs(15),
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
        }
    }
}

impl JsonApiConfig {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// BirdEye public API (Solana chain)
    pub fn birdeye() -> Self {
        let mut config = Self::new("birdeye", "https://public-api.birdeye.so");
        config.api_key_header = "X-API-KEY".to_string();
        config.default_headers = vec![("x-chain".to_string(), "solana".to_string())];
        config
    }

    /// Jupiter price and token APIs
    pub fn jupiter() -> Self {
        Self::new("jupiter", "https://api.jup.ag")
    }

    pub fn dexscreener() -> Self {
        Self::new("dexscreener", "https://api.dexscreener.com")
    }

    pub fn rugcheck() -> Self {
        Self::new("rugcheck", "https://api.rugcheck.xyz")
    }

    /// Meteora DLMM pools API
    pub fn meteora() -> Self {
        Self::new("meteora", "https://dlmm-api.meteora.ag")
    }

    /// Built-in config for a known API name
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "birdeye" => Some(Self::birdeye()),
            "jupiter" => Some(Self::jupiter()),
            "dexscreener" => Some(Self::dexscreener()),
            "rugcheck" => Some(Self::rugcheck()),
            "meteora" => Some(Self::meteora()),
            _ => None,
        }
    }

    /// Config for an `[apis.<name>]` section, keeping preset headers for known APIs
    pub fn from_section(name: &str, section: &ApiSection) -> Self {
        let mut config = Self::preset(name).unwrap_or_else(|| Self::new(name, ""));
        config.base_url = section.base_url.clone();
        config.api_key = section.get_api_key();
        config.api_key_header = section.api_key_header.clone();
        config.timeout = Duration::from_secs(section.timeout_secs);
        config.max_retries = section.max_retries;
        config
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

/// HTTP client returning untyped JSON
#[derive(Debug, Clone)]
pub struct JsonApiClient {
    config: JsonApiConfig,
    http: Client,
}

impl JsonApiClient {
    /// Create a new client with custom configuration
    pub fn with_config(config: JsonApiConfig) -> Result<Self, SourceError> {
        if config.base_url.is_empty() {
            return Err(SourceError::Config(format!("{}: base_url is empty", config.name)));
        }

        let mut headers = header::HeaderMap::new();
        for (name, value) in &config.default_headers {
            let name = header::HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| SourceError::Config(format!("bad header name {}: {}", name, e)))?;
            let value = header::HeaderValue::from_str(value)
                .map_err(|e| SourceError::Config(format!("bad header value: {}", e)))?;
            headers.insert(name, value);
        }

        let http = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| SourceError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, http })
    }

    pub fn config(&self) -> &JsonApiConfig {
        &self.config
    }

    /// Get the configured API base URL
    pub fn api_base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Join base URL and path with exactly one slash
    pub fn url(&self, path: &str) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            base.to_string()
        } else {
            format!("{}/{}", base, path)
        }
    }

    /// Execute request with retry logic and rate limit handling
    async fn execute_with_retry<F, Fut>(&self, request_fn: F) -> Result<reqwest::Response, SourceError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<reqwest::Response, SourceError>>,
    {
        let mut last_error = None;
        let attempts = self.config.max_retries + 1;

        for attempt in 0..attempts {
            let is_last = attempt + 1 == attempts;
            match request_fn().await {
                Ok(response) => {
                    let status = response.status();

                    // Handle rate limiting (429) with exponential backoff
                    if status == StatusCode::TOO_MANY_REQUESTS && !is_last {
                        let backoff = retry_after(&response)
                            .unwrap_or_else(|| Duration::from_secs(2u64.pow(attempt + 1)));
                        tracing::warn!(
                            api = %self.config.name,
                            "Rate limited (429), backing off for {:?} (attempt {}/{})",
                            backoff, attempt + 1, attempts
                        );
                        last_error = Some(SourceError::RateLimited);
                        tokio::time::sleep(backoff).await;
                        continue;
                    }

                    // Retry on server errors (5xx)
                    if status.is_server_error() && !is_last {
                        tracing::warn!(
                            api = %self.config.name,
                            status = status.as_u16(),
                            "Server error, retrying (attempt {}/{})",
                            attempt + 1, attempts
                        );
                        last_error = Some(SourceError::Status {
                            status: status.as_u16(),
                            body: String::new(),
                        });
                        tokio::time::sleep(self.config.retry_delay * (attempt + 1)).await;
                        continue;
                    }

                    return Ok(response);
                }
                Err(e) => {
                    tracing::warn!(api = %self.config.name, error = %e, "Request failed");
                    last_error = Some(e);
                    if !is_last {
                        tokio::time::sleep(self.config.retry_delay * (attempt + 1)).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| SourceError::Http("Max retries exceeded".into())))
    }

    /// Handle API response and decode JSON
    async fn handle_response(&self, response: reqwest::Response) -> Result<Value, SourceError> {
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SourceError::RateLimited);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| SourceError::Decode(e.to_string()))
    }
}

/// `Retry-After` in whole seconds, if the server sent one
fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[async_trait]
impl JsonSource for JsonApiClient {
    async fn get_json(&self, path: &str, query: &[(String, String)]) -> Result<Value, SourceError> {
        let url = self.url(path);

        let mut req = self.http.get(&url).query(query);
        if let Some(ref api_key) = self.config.api_key {
            req = req.header(self.config.api_key_header.as_str(), api_key);
        }

        tracing::debug!(api = %self.config.name, url = %url, "GET");

        let response = self
            .execute_with_retry(|| async {
                req.try_clone()
                    .ok_or_else(|| SourceError::Http("Failed to clone request".into()))?
                    .send()
                    .await
                    .map_err(|e| SourceError::Http(e.to_string()))
            })
            .await?;

        self.handle_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::Mutex;

    /// One-connection-per-response HTTP server; returns its base URL and the raw requests seen
    async fn serve(responses: Vec<(u16, &'static str)>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_by_server = Arc::clone(&seen);

        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = vec![0u8; 4096];
                let n = socket.read(&mut buf).await.unwrap();
                seen_by_server
                    .lock()
                    .await
                    .push(String::from_utf8_lossy(&buf[..n]).to_string());

                let reply = format!(
                    "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                socket.write_all(reply.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });

        (format!("http://{}", addr), seen)
    }

    fn client_for(base_url: String, max_retries: u32) -> JsonApiClient {
        let mut config = JsonApiConfig::new("test", base_url);
        config.max_retries = max_retries;
        config.retry_delay = Duration::from_millis(5);
        JsonApiClient::with_config(config).unwrap()
    }

    #[test]
    fn test_url_join() {
        let client = client_for("https://api.example.com/".to_string(), 0);
        assert_eq!(client.url("/defi/price"), "https://api.example.com/defi/price");
        assert_eq!(client.url("defi/price"), "https://api.example.com/defi/price");
        assert_eq!(client.url(""), "https://api.example.com");
    }

    #[test]
    fn test_presets() {
        let birdeye = JsonApiConfig::preset("birdeye").unwrap();
        assert_eq!(birdeye.api_key_header, "X-API-KEY");
        assert!(birdeye
            .default_headers
            .iter()
            .any(|(name, value)| name == "x-chain" && value == "solana"));

        for name in ["jupiter", "dexscreener", "rugcheck", "meteora"] {
            let config = JsonApiConfig::preset(name).unwrap();
            assert!(config.base_url.starts_with("https://"));
            assert_eq!(config.name, name);
        }
        assert!(JsonApiConfig::preset("unknown").is_none());
    }

    #[test]
    fn test_empty_base_url_rejected() {
        let result = JsonApiClient::with_config(JsonApiConfig::new("empty", ""));
        assert!(matches!(result.unwrap_err(), SourceError::Config(_)));
    }

    #[tokio::test]
    async fn test_get_json_sends_query_and_key() {
        let (base_url, seen) = serve(vec![(200, r#"{"data":{"value":1.25}}"#)]).await;
        let mut config = JsonApiConfig::new("test", base_url).with_api_key("k-123");
        config.api_key_header = "X-API-KEY".to_string();
        let client = JsonApiClient::with_config(config).unwrap();

        let query = vec![("address".to_string(), "TOK".to_string())];
        let value = client.get_json("/defi/price", &query).await.unwrap();

        assert_eq!(value, json!({"data": {"value": 1.25}}));
        let requests = seen.lock().await;
        assert!(requests[0].starts_with("GET /defi/price?address=TOK "));
        assert!(requests[0].to_lowercase().contains("x-api-key: k-123"));
    }

    #[tokio::test]
    async fn test_retries_server_error() {
        let (base_url, seen) = serve(vec![(503, "{}"), (200, r#"{"ok":true}"#)]).await;
        let client = client_for(base_url, 2);

        let value = client.get_json("/status", &[]).await.unwrap();

        assert_eq!(value, json!({"ok": true}));
        assert_eq!(seen.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let (base_url, seen) = serve(vec![(404, r#"{"error":"not found"}"#)]).await;
        let client = client_for(base_url, 3);

        let err = client.get_json("/missing", &[]).await.unwrap_err();

        assert!(matches!(err, SourceError::Status { status: 404, .. }));
        assert_eq!(seen.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_rate_limited_without_retries() {
        let (base_url, _) = serve(vec![(429, "{}")]).await;
        let client = client_for(base_url, 0);

        let err = client.get_json("/busy", &[]).await.unwrap_err();
        assert_eq!(err, SourceError::RateLimited);
    }

    #[tokio::test]
    async fn test_invalid_json() {
        let (base_url, _) = serve(vec![(200, "not json")]).await;
        let client = client_for(base_url, 0);

        let err = client.get_json("/broken", &[]).await.unwrap_err();
        assert!(matches!(err, SourceError::Decode(_)));
    }
}
