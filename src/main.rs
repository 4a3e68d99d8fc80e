use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use parking_lot::RwLock;
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber;

use floodgate::config::FloodgateConfig;
use floodgate::http::HttpServer;
use floodgate::ratelimit::{spawn_sweeper, RateLimiter};

#[derive(Parser, Debug)]
#[command(name = "floodgate")]
#[command(about = "Per-key HTTP rate limiting service")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen address from configuration
    #[arg(short, long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .init();

    info!("Starting Floodgate Rate Limiting Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => FloodgateConfig::from_file(path)?,
        None => FloodgateConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.server.listen_addr = listen;
    }
    info!(listen_addr = %config.server.listen_addr, "Configuration loaded");

    // Build the route rule table; invalid rules abort startup
    let rules = config.rate_limiting.route_rules()?;
    info!(rule_count = rules.len(), "Route rules loaded");
    let rules = Arc::new(RwLock::new(rules));

    // Initialize the rate limiter and background sweep
    let rate_limiter = Arc::new(RateLimiter::new());
    info!("Rate limiter initialized");

    let sweeper = spawn_sweeper(
        Arc::clone(&rate_limiter),
        Duration::from_secs(config.rate_limiting.sweep_interval_secs),
    );

    // Create and start the HTTP server
    let server = HttpServer::new(
        config.server.listen_addr,
        Arc::clone(&rate_limiter),
        rules,
        config.rate_limiting.trust_forwarded_headers,
    );

    info!("Starting HTTP server on {}", config.server.listen_addr);

    // Run the server with graceful shutdown on Ctrl+C
    server.serve_with_shutdown(shutdown_signal()).await?;

    sweeper.abort();
    info!("Floodgate Rate Limiting Service stopped");
    Ok(())
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
