//! CLI Commands
//!
//! Argument definitions for the token-scout binary.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// token-scout - Rate-limited, cached access to token discovery APIs
#[derive(Parser, Debug)]
#[command(
    name = "token-scout",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = "Rate-limited, cached access to Solana token discovery APIs",
    long_about = "token-scout puts a per-domain sliding-window rate limiter and a \
                  position-aware TTL cache in front of BirdEye, Jupiter, Meteora, \
                  DexScreener and RugCheck."
)]
pub struct CliApp {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate a config file and print the effective settings
    CheckConfig(CheckConfigCmd),

    /// GET a path from a configured API through the cache and limiter
    Fetch(FetchCmd),

    /// Fetch per-token data with tracked/position TTLs
    Token(TokenCmd),

    /// Measure limiter throughput locally (no network)
    BenchLimiter(BenchLimiterCmd),
}

/// Validate configuration
#[derive(Parser, Debug)]
pub struct CheckConfigCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/default.toml")]
    pub config: PathBuf,
}

/// Fetch an API path
#[derive(Parser, Debug)]
pub struct FetchCmd {
    /// API name from the config (e.g., birdeye)
    #[arg(value_name = "API")]
    pub api: String,

    /// Request path (e.g., /defi/price)
    #[arg(value_name = "PATH")]
    pub path: String,

    /// Query parameter, repeatable
    #[arg(short, long = "query", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub query: Vec<(String, String)>,

    /// Number of times to issue the request (shows cache hits)
    #[arg(short, long, value_name = "N", default_value = "1")]
    pub repeat: u32,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/default.toml")]
    pub config: PathBuf,
}

/// Fetch per-token data
#[derive(Parser, Debug)]
pub struct TokenCmd {
    /// API name from the config (e.g., rugcheck)
    #[arg(value_name = "API")]
    pub api: String,

    /// Data type (e.g., token_security, position_price)
    #[arg(value_name = "DATA_TYPE")]
    pub data_type: String,

    /// Token mint address
    #[arg(value_name = "TOKEN")]
    pub token: String,

    /// Request path; `{token}` is replaced with the address
    #[arg(value_name = "PATH")]
    pub path: String,

    /// Query parameter, repeatable; `{token}` is replaced with the address
    #[arg(short, long = "query", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub query: Vec<(String, String)>,

    /// Register the token as tracked
    #[arg(long)]
    pub tracked: bool,

    /// Register the token as an active position (implies --tracked)
    #[arg(long)]
    pub position: bool,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = "config/default.toml")]
    pub config: PathBuf,
}

/// Benchmark the rate limiter
#[derive(Parser, Debug)]
pub struct BenchLimiterCmd {
    /// Calls allowed per window
    #[arg(long, value_name = "N", default_value = "5")]
    pub calls: u32,

    /// Window length in seconds
    #[arg(long, value_name = "SECS", default_value = "1.0")]
    pub period: f64,

    /// Total acquisitions to perform
    #[arg(short, long, value_name = "N", default_value = "20")]
    pub requests: u32,

    /// Concurrent tasks sharing the limiter
    #[arg(long, value_name = "N", default_value = "4")]
    pub concurrency: u32,
}

/// Parse a `KEY=VALUE` pair
pub fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    if key.is_empty() {
        return Err(format!("empty key in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}
