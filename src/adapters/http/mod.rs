//! HTTP Adapter
//!
//! reqwest-backed implementation of the `JsonSource` port.

mod client;

pub use client::{JsonApiClient, JsonApiConfig};
