//! CLI Adapter
//!
//! Command-line interface for token-scout.
//! Uses clap derive macros for argument parsing.

mod commands;

pub use commands::{
    parse_key_val, BenchLimiterCmd, CheckConfigCmd, CliApp, Command, FetchCmd, TokenCmd,
};
