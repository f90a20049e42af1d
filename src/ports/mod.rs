//! Ports Layer - Trait definitions for external dependencies
//!
//! The cache and limiter sit in front of these; adapters implement them.

pub mod json_source;

pub use json_source::{JsonSource, SourceError};
