//! microserve binary.
//!
//! ```text
//!     Client Request
//!     ───────────────▶ axum / axum-server (TLS)
//!                          │  request id, timeout, trace
//!                          ▼
//!                    PatternRegistry ──▶ /ping, /stats, /includes/
//!                          │
//!          ┌───────────────┼────────────────┬──────────────┐
//!          ▼               ▼                ▼              ▼
//!     controller      remote route      local alias     redirect
//!     dispatcher      (reverse proxy)   (re-dispatch)
//!          │               │
//!          ▼               ▼
//!     QueryExecutor     upstream
//!     + Connection
//!       Registry
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use microserve::config::{load_config, ServiceConfig};
use microserve::db::PgDriver;
use microserve::lifecycle::{build_service, spawn_signal_handler, Shutdown};
use microserve::observability::{init_logging, metrics};

#[derive(Parser)]
#[command(name = "microserve", version, about = "HTTP micro-service scaffold")]
struct Args {
    /// TOML configuration file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ServiceConfig::default(),
    };

    init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "microserve starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        tls = config.listener.tls.is_some(),
        request_timeout_secs = config.timeouts.request_secs,
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

    let driver = Arc::new(PgDriver::new(Duration::from_secs(config.timeouts.connect_secs)));
    let service = build_service(&config, driver).await?;

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());
    service.serve(&config.listener, &shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
