//! token-scout CLI
//!
//! Exercises the rate limiter and position-aware cache against the
//! configured token discovery APIs.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing_subscriber::{fmt, EnvFilter};

use token_scout::adapters::cli::{BenchLimiterCmd, CheckConfigCmd, CliApp, Command, FetchCmd, TokenCmd};
use token_scout::application::Services;
use token_scout::config::{load_config, Config};
use token_scout::limiter::{RateLimitConfig, RateLimiter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (API keys go here, not in config.toml)
    dotenvy::dotenv().ok();

    let app = CliApp::parse();

    match app.command {
        Command::CheckConfig(cmd) => check_config_command(cmd, app.verbose, app.debug),
        Command::Fetch(cmd) => fetch_command(cmd, app.verbose, app.debug).await,
        Command::Token(cmd) => token_command(cmd, app.verbose, app.debug).await,
        Command::BenchLimiter(cmd) => {
            init_logging(app.verbose, app.debug, None)?;
            bench_limiter_command(cmd).await
        }
    }
}

/// RUST_LOG wins, then the CLI flags, then the config file level
fn init_logging(verbose: bool, debug: bool, config_level: Option<&str>) -> Result<()> {
    let filter = if let Ok(filter) = EnvFilter::try_from_default_env() {
        filter
    } else if debug {
        EnvFilter::new("debug")
    } else if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::new(config_level.unwrap_or("warn"))
    };

    fmt().with_env_filter(filter).with_target(false).init();
    Ok(())
}

/// Load config, expanding `~`, and start logging at its level
fn load_with_logging(path: &Path, verbose: bool, debug: bool) -> Result<Config> {
    let path = PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).to_string());
    let config = load_config(&path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    init_logging(verbose, debug, Some(&config.logging.level))?;
    tracing::debug!("Config: {}", path.display());
    Ok(config)
}

fn check_config_command(cmd: CheckConfigCmd, verbose: bool, debug: bool) -> Result<()> {
    let config = load_with_logging(&cmd.config, verbose, debug)?;
    let services = Services::from_config(&config).context("Failed to build services")?;

    println!("✓ Configuration valid: {}", cmd.config.display());
    println!();
    println!(
        "Rate limits ({}):",
        if services.limiter.is_enabled() { "enabled" } else { "disabled" }
    );
    for domain in services.limiter.domains() {
        if let Some(limit) = services.limiter.config_for(&domain) {
            println!("  {:<14} {} calls / {:?}", domain, limit.max_calls, limit.period);
        }
    }

    println!();
    println!("Data types:");
    for name in services.cache.data_types() {
        let data_type = services.cache.data_type_config(&name);
        println!(
            "  {:<16} ttl {:>6.0}s  {:<8}  auto_refresh={}",
            name,
            data_type.ttl.as_secs_f64(),
            data_type.priority,
            data_type.auto_refresh
        );
    }

    println!();
    println!("APIs:");
    for name in services.source_names() {
        if let Some(source) = services.source(&name) {
            let key = match config.apis.get(&name).and_then(|api| api.get_api_key()) {
                Some(_) => "api key set",
                None => "no api key",
            };
            println!(
                "  {:<14} domain={:<12} ttl={:?}  {}",
                name,
                source.domain(),
                source.ttl(),
                key
            );
        }
    }

    Ok(())
}

async fn fetch_command(cmd: FetchCmd, verbose: bool, debug: bool) -> Result<()> {
    let config = load_with_logging(&cmd.config, verbose, debug)?;
    let services = Services::from_config(&config).context("Failed to build services")?;
    let Some(source) = services.source(&cmd.api) else {
        bail!(
            "Unknown API '{}'. Configured: {}",
            cmd.api,
            services.source_names().join(", ")
        );
    };

    for attempt in 1..=cmd.repeat.max(1) {
        let started = Instant::now();
        let value = source
            .get(&cmd.path, &cmd.query)
            .await
            .with_context(|| format!("GET {} {} failed", cmd.api, cmd.path))?;

        if attempt == 1 {
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        tracing::info!(attempt, elapsed_ms = started.elapsed().as_millis() as u64, "Fetched");
    }

    print_statistics(&services);
    Ok(())
}

async fn token_command(cmd: TokenCmd, verbose: bool, debug: bool) -> Result<()> {
    let config = load_with_logging(&cmd.config, verbose, debug)?;
    let services = Services::from_config(&config).context("Failed to build services")?;
    let Some(source) = services.source(&cmd.api) else {
        bail!(
            "Unknown API '{}'. Configured: {}",
            cmd.api,
            services.source_names().join(", ")
        );
    };

    if cmd.tracked || cmd.position {
        services.cache.register_tracked_token(&cmd.token, cmd.position);
    }

    let path = cmd.path.replace("{token}", &cmd.token);
    let query: Vec<(String, String)> = cmd
        .query
        .iter()
        .map(|(k, v)| (k.clone(), v.replace("{token}", &cmd.token)))
        .collect();

    let value = source
        .get_token(&cmd.data_type, &cmd.token, &path, &query)
        .await
        .with_context(|| format!("GET {} {} failed", cmd.api, path))?;

    println!("{}", serde_json::to_string_pretty(&value)?);
    println!(
        "\nCached as {} for {:?} ({:?})",
        cmd.data_type,
        services.cache.effective_ttl(&cmd.data_type, &cmd.token),
        services.cache.membership(&cmd.token)
    );
    print_statistics(&services);
    Ok(())
}

fn print_statistics(services: &Services) {
    let stats = services.cache.statistics();
    println!(
        "\nCache: {} hits / {} misses ({:.1}% hit rate), {} entries",
        stats.hits, stats.misses, stats.hit_rate_percent, stats.entries
    );
}

async fn bench_limiter_command(cmd: BenchLimiterCmd) -> Result<()> {
    let limit = RateLimitConfig::from_secs_f64(cmd.calls, cmd.period)
        .context("Invalid rate limit")?;
    let limiter = Arc::new(RateLimiter::new());
    limiter.configure("bench", limit);

    let concurrency = cmd.concurrency.max(1);
    let started = Instant::now();
    let mut handles = Vec::with_capacity(concurrency as usize);

    for worker in 0..concurrency {
        // Spread requests as evenly as possible over workers
        let share = cmd.requests / concurrency + u32::from(worker < cmd.requests % concurrency);
        let limiter = Arc::clone(&limiter);
        handles.push(tokio::spawn(async move {
            for _ in 0..share {
                limiter.acquire("bench").await;
            }
            share
        }));
    }

    let mut completed = 0;
    for handle in handles {
        completed += handle.await.context("Benchmark worker panicked")?;
    }

    let elapsed = started.elapsed();
    let expected = expected_duration(cmd.requests, limit);
    println!("Limiter: {} calls / {:?}", limit.max_calls, limit.period);
    println!("  Requests:   {} across {} tasks", completed, concurrency);
    println!("  Elapsed:    {:.3}s (ideal {:.3}s)", elapsed.as_secs_f64(), expected.as_secs_f64());
    if elapsed > Duration::ZERO {
        println!("  Throughput: {:.2} calls/s", completed as f64 / elapsed.as_secs_f64());
    }

    Ok(())
}

/// Minimum time `requests` back-to-back acquisitions need under `limit`
fn expected_duration(requests: u32, limit: RateLimitConfig) -> Duration {
    if requests == 0 {
        return Duration::ZERO;
    }
    let full_windows = (requests - 1) / limit.max_calls;
    limit.period * full_windows
}
