//! Adapters Layer - External System Implementations
//!
//! This module contains implementations of the port traits:
//! - HTTP: reqwest client for the token discovery APIs
//! - CLI: Command-line interface definitions

pub mod cli;
pub mod http;

pub use cli::CliApp;
pub use http::{JsonApiClient, JsonApiConfig};
