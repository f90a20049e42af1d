//! JSON Source Port
//!
//! Anything that can answer a GET with a JSON document: an HTTP API client in
//! production, a fake in tests. Responses stay untyped `serde_json::Value`;
//! interpreting API fields is left to callers.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Errors from a JSON source
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Rate limited by upstream API")]
    RateLimited,

    #[error("Failed to parse response: {0}")]
    Decode(String),

    #[error("Invalid client configuration: {0}")]
    Config(String),
}

impl SourceError {
    /// Whether retrying the same request later could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::Http(_) | SourceError::RateLimited => true,
            SourceError::Status { status, .. } => *status >= 500,
            SourceError::Decode(_) | SourceError::Config(_) => false,
        }
    }
}

/// Read-only JSON API
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JsonSource: Send + Sync {
    /// GET `path` (relative to the source's base URL) with query parameters
    async fn get_json(&self, path: &str, query: &[(String, String)]) -> Result<Value, SourceError>;
}
