//! token-scout - rate limiting and caching for token discovery APIs
//!
//! Every outbound call to BirdEye, Jupiter, Meteora, DexScreener or RugCheck
//! goes through a shared per-domain rate limiter and a TTL cache that keeps
//! data for tracked tokens and open positions longer.
//!
//! # Modules
//!
//! - `domain`: Rate windows, cache priorities, tracked token registry
//! - `limiter`: Per-domain sliding-window `RateLimiter`
//! - `cache`: `TtlCache` and the position-aware layer on top of it
//! - `ports`: `JsonSource` trait for origin APIs
//! - `adapters`: HTTP client and CLI definitions
//! - `config`: Configuration loading and validation
//! - `application`: Gateway, cached sources and service wiring

pub mod adapters;
pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod limiter;
pub mod ports;
