//! Domain Layer - Core types for rate limiting and caching
//!
//! Pure bookkeeping with no I/O; the limiter and cache build on these.

pub mod priority;
pub mod rate_window;
pub mod tracked_tokens;

pub use priority::{default_data_types, CachePriority, DataTypeConfig};
pub use rate_window::{Admission, RateLimitConfig, RateLimitConfigError, RateWindow, MAX_PERIOD, MIN_WAIT};
pub use tracked_tokens::{TokenMembership, TrackedTokenRegistry, POSITION_TTL_FACTOR, TRACKED_TTL_FACTOR};
