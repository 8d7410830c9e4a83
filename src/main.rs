//! HTTP tracking reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌────────────────────────────────────────────────┐
//!                      │                 HTTP TRACKER                   │
//!                      │                                                │
//!   Client Request     │  ┌─────────┐   ┌──────────────┐   ┌─────────┐  │
//!   ───────────────────┼─▶│  trace  │──▶│   tracking   │──▶│ forward │──┼──▶ Upstream
//!                      │  │  layer  │   │  middleware  │   │ handler │  │
//!   Client Response    │  └─────────┘   └──────┬───────┘   └─────────┘  │
//!   ◀──────────────────┼────────────── tee'd bodies ◀───────────────────┼─── Upstream
//!                      │                      │                         │
//!                      │                      ▼                         │
//!                      │               ┌─────────────┐                  │
//!                      │               │    store    │ file / log / mem │
//!                      │               └─────────────┘                  │
//!                      └────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use http_tracker::config::{load_config, validate_config, TrackerConfig};
use http_tracker::lifecycle::{signals, Shutdown};
use http_tracker::observability::{logging, metrics};
use http_tracker::{store, HttpServer};

#[derive(Parser)]
#[command(name = "http-tracker")]
#[command(about = "Reverse proxy that records every HTTP call it forwards", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override listener.bind_address.
    #[arg(long)]
    bind: Option<String>,

    /// Override upstream.address.
    #[arg(long)]
    upstream: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => TrackerConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }
    if let Some(upstream) = cli.upstream {
        config.upstream.address = upstream;
    }
    if let Err(errors) = validate_config(&config) {
        for error in &errors {
            eprintln!("config error: {}", error);
        }
        return Err(format!("{} configuration error(s)", errors.len()).into());
    }

    logging::init_logging(&config.observability.log_level);
    tracing::info!("http-tracker v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.address,
        header_name = %config.tracking.header_name,
        max_request = ?config.tracking.max_recorded_request_length,
        max_response = ?config.tracking.max_recorded_response_length,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let store = store::open(&config.store).await?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, store)?;
    let server_shutdown = shutdown.subscribe();

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move { signals::shutdown_on_ctrl_c(&shutdown).await }
    });

    server.run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
