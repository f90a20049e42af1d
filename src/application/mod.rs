//! Application Layer - Wiring between the core and the connectors
//!
//! - `gateway`: cache → limiter → origin → cache control flow
//! - `cached_source`: a `JsonSource` bound to a domain behind the gateway
//! - `services`: builds the shared instances from `Config`

pub mod cached_source;
pub mod gateway;
pub mod services;

pub use cached_source::{request_key, CachedSource};
pub use gateway::{ApiGateway, GatewayError};
pub use services::{ServiceError, Services};
