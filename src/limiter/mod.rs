//! Rate Limiting
//!
//! Per-domain sliding-window limiter that every outbound API call passes
//! through before hitting the network.

mod rate_limiter;

pub use rate_limiter::{LimiterError, LimiterStats, RateLimiter, DEFAULT_DOMAIN};
pub use crate::domain::rate_window::{RateLimitConfig, RateLimitConfigError, MAX_PERIOD, MIN_WAIT};
