//! stagegate: staged reverse proxy.
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http server ──▶ PipelineEngine
//!                                        │ pre-response stages
//!                                        ▼
//!                                   HostRouter / PathRouter
//!                                        │
//!                                        ▼
//!                                   UpstreamConnector ──▶ Backend
//!                                        │
//!     Client Response                    ▼
//!     ◀────────────── http server ◀── post-response stages
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use stagegate::config::{load_config, ProxyConfig};
use stagegate::health::LivenessMonitor;
use stagegate::lifecycle::{pipeline_from_config, Shutdown};
use stagegate::observability::{default_logger, metrics, tracing::init_tracing};
use stagegate::HttpServer;

#[derive(Parser, Debug)]
#[command(name = "stagegate", version, about = "Staged reverse proxy")]
struct Args {
    /// Path to a TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    init_tracing(&config.observability.log_level);
    tracing::info!("stagegate v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstreams = config.upstreams.len(),
        routes = config.routes.len(),
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

    let gateway = pipeline_from_config(&config, default_logger())?;
    let shutdown = Arc::new(Shutdown::new());

    if config.health_check.enabled {
        let monitor = Arc::new(LivenessMonitor::new(
            gateway.upstreams.clone(),
            Duration::from_secs(config.health_check.interval_secs),
        ));
        tokio::spawn(monitor.run(shutdown.subscribe()));
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(gateway.engine.clone());
    let server_shutdown = shutdown.subscribe();
    let signal = shutdown.clone();
    tokio::spawn(async move { signal.trigger_on_ctrl_c().await });

    server.run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
