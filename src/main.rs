use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use turnstile::config::TurnstileConfig;
use turnstile::http::{AppState, HttpServer};
use turnstile::ratelimit::{
    spawn_sweeper, InMemoryQuotaStore, InMemoryTimestampLog, RateLimiter, TimestampLog,
};

/// Sliding window rate limiting service.
#[derive(Parser, Debug)]
#[command(name = "turnstile", version, about)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the HTTP listen address
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    info!("Starting Turnstile Rate Limiting Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = match &cli.config {
        Some(path) => TurnstileConfig::from_file(path)?,
        None => TurnstileConfig::default(),
    };
    if let Some(addr) = cli.listen {
        config.server.http_addr = addr;
    }
    info!(
        http_addr = %config.server.http_addr,
        window_secs = config.rate_limiting.window_secs,
        strategy = ?config.rate_limiting.strategy,
        cleanup = ?config.rate_limiting.cleanup,
        "Configuration loaded"
    );

    // Stores live for the whole process and are released after shutdown
    let log = Arc::new(InMemoryTimestampLog::new());
    let quotas = Arc::new(InMemoryQuotaStore::with_namespace(
        &config.rate_limiting.limit_namespace,
    ));
    let seeded = config.seed_quotas(quotas.as_ref()).await?;
    info!(quotas = seeded, "Quota store initialized");

    let window = config.rate_limiting.window();
    let rate_limiter = Arc::new(
        RateLimiter::new(log.clone(), quotas)
            .with_evaluator(window, config.rate_limiting.strategy)
            .with_cleanup(config.rate_limiting.cleanup)
            .with_request_namespace(&config.rate_limiting.request_namespace),
    );
    info!("Rate limiter initialized");

    let sweeper = config
        .rate_limiting
        .sweep_interval()
        .map(|interval| spawn_sweeper(log.clone(), window, interval));

    let state = AppState::new(
        rate_limiter,
        Duration::from_millis(config.server.simulate_delay_ms),
    );
    let server = HttpServer::new(config.server.http_addr, state);

    info!("Starting HTTP server on {}", config.server.http_addr);

    // Run the server with graceful shutdown on Ctrl+C
    server.serve_with_shutdown(shutdown_signal()).await?;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    log.close().await?;

    info!("Turnstile Rate Limiting Service stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
