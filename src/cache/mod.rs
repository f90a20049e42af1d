//! Caching
//!
//! `TtlCache` is the plain key → JSON store; `PositionAwareCache` layers
//! per-data-type policy and tracked-token TTL scaling on top of it.

pub mod position;
pub mod ttl;

pub use position::{cache_key, CacheStatistics, PositionAwareCache, RefreshHint, REFRESH_THRESHOLD};
pub use ttl::{CacheEntry, TtlCache, DEFAULT_TTL, MAX_TTL};
