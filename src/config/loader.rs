//! Configuration Loader
//!
//! Loads and validates configuration from TOML files matching config.toml structure.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::cache::MAX_TTL;
use crate::domain::priority::{default_data_types, CachePriority, DataTypeConfig};
use crate::domain::rate_window::{RateLimitConfig, RateLimitConfigError};

/// Main configuration structure matching config.toml
///
/// Every section is optional; an empty file yields a working setup with a
/// single 5 calls/s default limit and the built-in data types.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub rate_limiter: RateLimiterSettings,
    pub cache: CacheSettings,
    /// API connectors keyed by name ("birdeye", "jupiter", ...)
    pub apis: HashMap<String, ApiSection>,
    pub logging: LoggingSection,
}

/// Rate limiter configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimiterSettings {
    /// Global switch; when false `acquire` never waits
    pub enabled: bool,
    /// Per-domain limits; the "default" entry covers unlisted domains
    pub domains: HashMap<String, DomainLimitSection>,
}

impl Default for RateLimiterSettings {
    fn default() -> Self {
        let mut domains = HashMap::new();
        domains.insert(
            crate::limiter::DEFAULT_DOMAIN.to_string(),
            DomainLimitSection {
                calls: 5,
                period: 1.0,
            },
        );
        Self {
            enabled: true,
            domains,
        }
    }
}

/// One domain's limit: `calls` per `period` seconds
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct DomainLimitSection {
    pub calls: u32,
    pub period: f64,
}

impl DomainLimitSection {
    pub fn to_limit(&self) -> Result<RateLimitConfig, RateLimitConfigError> {
        RateLimitConfig::from_secs_f64(self.calls, self.period)
    }
}

/// Cache configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// TTL for plain `set_default` writes, and the base for priority-derived TTLs
    pub default_ttl_secs: f64,
    /// Per-data-type overrides, merged over the built-in table
    pub data_types: HashMap<String, DataTypeSection>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            default_ttl_secs: 300.0,
            data_types: HashMap::new(),
        }
    }
}

/// Caching policy for one data type
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DataTypeSection {
    /// Omitted: cache default TTL × priority multiplier
    #[serde(default)]
    pub ttl_seconds: Option<f64>,
    #[serde(default)]
    pub priority: CachePriority,
    #[serde(default)]
    pub auto_refresh: bool,
    #[serde(default)]
    pub cost_weight: f64,
}

impl CacheSettings {
    pub fn default_ttl(&self) -> Result<Duration, ConfigError> {
        secs_to_duration("cache.default_ttl_secs", self.default_ttl_secs)
    }

    /// Built-in data types with this section's entries laid over them
    pub fn data_type_configs(&self) -> Result<HashMap<String, DataTypeConfig>, ConfigError> {
        let default_ttl = self.default_ttl()?;
        let mut configs = default_data_types();

        for (name, section) in &self.data_types {
            let ttl = match section.ttl_seconds {
                Some(secs) => secs_to_duration(&format!("cache.data_types.{}.ttl_seconds", name), secs)?,
                None => default_ttl.mul_f64(section.priority.ttl_multiplier()),
            };
            if !section.cost_weight.is_finite() || section.cost_weight < 0.0 {
                return Err(ConfigError::ValidationError(format!(
                    "cache.data_types.{}.cost_weight must be >= 0, got {}",
                    name, section.cost_weight
                )));
            }
            let config = DataTypeConfig::new(ttl, section.priority)
                .with_auto_refresh(section.auto_refresh)
                .with_cost_weight(section.cost_weight);
            configs.insert(name.clone(), config);
        }

        Ok(configs)
    }
}

/// Seconds to a TTL, capped at `MAX_TTL`
fn secs_to_duration(field: &str, secs: f64) -> Result<Duration, ConfigError> {
    let ttl = Duration::try_from_secs_f64(secs).map_err(|_| {
        ConfigError::ValidationError(format!(
            "{} must be a non-negative number of seconds, got {}",
            field, secs
        ))
    })?;
    if ttl > MAX_TTL {
        return Err(ConfigError::ValidationError(format!(
            "{} must be at most {}s (10 years), got {}",
            field,
            MAX_TTL.as_secs(),
            secs
        )));
    }
    Ok(ttl)
}

/// External API connector section
#[derive(Debug, Clone, Deserialize)]
pub struct ApiSection {
    /// Base URL, e.g. "https://public-api.birdeye.so"
    pub base_url: String,
    /// Rate-limit domain; defaults to the section name
    #[serde(default)]
    pub domain: Option<String>,
    /// API key in the config file (prefer `api_key_env`)
    #[serde(default)]
    pub api_key: Option<String>,
    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Header the key is sent in
    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries on 429/5xx inside the connector
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// TTL for cached responses; defaults to the cache default TTL
    #[serde(default)]
    pub cache_ttl_secs: Option<f64>,
}

fn default_api_key_header() -> String {
    "x-api-key".to_string()
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_max_retries() -> u32 {
    3
}

impl ApiSection {
    /// Rate-limit domain for this API
    pub fn domain_or<'a>(&'a self, name: &'a str) -> &'a str {
        self.domain.as_deref().unwrap_or(name)
    }

    /// Validated `cache_ttl_secs`; `None` means the cache default applies
    pub fn cache_ttl(&self, name: &str) -> Result<Option<Duration>, ConfigError> {
        self.cache_ttl_secs
            .map(|secs| secs_to_duration(&format!("apis.{}.cache_ttl_secs", name), secs))
            .transpose()
    }

    /// Get API key with environment variable fallback
    /// Checks the `api_key_env` variable if the config value is empty/None
    pub fn get_api_key(&self) -> Option<String> {
        if let Some(ref key) = self.api_key {
            if !key.is_empty() {
                return Some(key.clone());
            }
        }
        self.api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.is_empty())
    }
}

/// Logging configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate rate limits
        for (domain, section) in &self.rate_limiter.domains {
            section.to_limit().map_err(|e| {
                ConfigError::ValidationError(format!("rate_limiter.domains.{}: {}", domain, e))
            })?;
        }

        // Validate cache
        if self.cache.default_ttl()?.is_zero() {
            return Err(ConfigError::ValidationError(
                "cache.default_ttl_secs must be > 0".to_string(),
            ));
        }
        self.cache.data_type_configs()?;

        // Validate APIs
        for (name, api) in &self.apis {
            if api.base_url.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "apis.{}.base_url cannot be empty",
                    name
                )));
            }
            if !api.base_url.starts_with("http://") && !api.base_url.starts_with("https://") {
                return Err(ConfigError::ValidationError(format!(
                    "apis.{}.base_url must be an http(s) URL, got {}",
                    name, api.base_url
                )));
            }
            if api.timeout_secs == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "apis.{}.timeout_secs must be > 0",
                    name
                )));
            }
            api.cache_ttl(name)?;
        }

        // Validate logging
        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "logging.level must be one of {:?}, got {}",
                LOG_LEVELS, self.logging.level
            )));
        }

        Ok(())
    }
}
