//! Cache Priority and Data-Type Policy
//!
//! Each kind of cached API data (prices, holder lists, security reports, ...)
//! carries a TTL, an advisory priority and whether position tokens should get
//! refresh hints when the entry is about to expire.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Advisory priority of cached data
///
/// The cache is TTL-only, so priority never drives eviction. It maps to a
/// fixed TTL multiplier used when a data type has no explicit TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CachePriority {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

impl CachePriority {
    /// Multiplier applied to the cache-wide default TTL
    ///
    /// Critical data (live position prices) goes stale fastest.
    pub fn ttl_multiplier(&self) -> f64 {
        match self {
            CachePriority::Critical => 0.25,
            CachePriority::High => 0.5,
            CachePriority::Medium => 1.0,
            CachePriority::Low => 2.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CachePriority::Critical => "critical",
            CachePriority::High => "high",
            CachePriority::Medium => "medium",
            CachePriority::Low => "low",
        }
    }
}

impl fmt::Display for CachePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Caching policy for one data type
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataTypeConfig {
    /// Base TTL before tracked/position scaling
    pub ttl: Duration,
    pub priority: CachePriority,
    /// Emit refresh hints for position tokens close to expiry
    pub auto_refresh: bool,
    /// Estimated cost of one origin call, used for the savings statistic
    pub cost_weight: f64,
}

impl DataTypeConfig {
    pub fn new(ttl: Duration, priority: CachePriority) -> Self {
        Self {
            ttl,
            priority,
            auto_refresh: false,
            cost_weight: 0.0,
        }
    }

    pub fn with_auto_refresh(mut self, auto_refresh: bool) -> Self {
        self.auto_refresh = auto_refresh;
        self
    }

    pub fn with_cost_weight(mut self, cost_weight: f64) -> Self {
        self.cost_weight = cost_weight;
        self
    }

    /// Policy for data types nobody configured: short TTL, lowest priority
    pub fn fallback() -> Self {
        Self::new(Duration::from_secs(60), CachePriority::Low)
    }
}

/// Built-in data types for the discovery APIs
pub fn default_data_types() -> HashMap<String, DataTypeConfig> {
    let secs = Duration::from_secs;
    [
        (
            "position_price",
            DataTypeConfig::new(secs(30), CachePriority::Critical)
                .with_auto_refresh(true)
                .with_cost_weight(0.002),
        ),
        (
            "token_price",
            DataTypeConfig::new(secs(60), CachePriority::High).with_cost_weight(0.001),
        ),
        (
            "token_overview",
            DataTypeConfig::new(secs(300), CachePriority::High).with_cost_weight(0.003),
        ),
        (
            "trade_data",
            DataTypeConfig::new(secs(120), CachePriority::Medium)
                .with_auto_refresh(true)
                .with_cost_weight(0.002),
        ),
        (
            "holders",
            DataTypeConfig::new(secs(900), CachePriority::Medium).with_cost_weight(0.004),
        ),
        (
            "pool_stats",
            DataTypeConfig::new(secs(180), CachePriority::Medium).with_cost_weight(0.002),
        ),
        (
            "vlr_metrics",
            DataTypeConfig::new(secs(300), CachePriority::Medium)
                .with_auto_refresh(true)
                .with_cost_weight(0.002),
        ),
        (
            "token_security",
            DataTypeConfig::new(secs(1800), CachePriority::Low).with_cost_weight(0.005),
        ),
        (
            "token_metadata",
            DataTypeConfig::new(secs(3600), CachePriority::Low).with_cost_weight(0.001),
        ),
    ]
    .into_iter()
    .map(|(name, config)| (name.to_string(), config))
    .collect()
}
