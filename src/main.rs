//! Pulse server.
//!
//! ```text
//!  instrumented services                         dashboards
//!        │  POST /api/v1/{spans,traces,logs,metrics}   ▲  GET /api/v1/...
//!        ▼                                             │  WS /api/v1/stream/{kind}
//!  ┌───────────┐   ┌──────────────┐   ┌─────────┐   ┌──────────┐
//!  │   http    │──▶│    ingest    │──▶│ storage │◀──│  stream  │
//!  │  server   │   │ +propagation │   │ (query) │   │ sessions │
//!  └───────────┘   └──────────────┘   └─────────┘   └──────────┘
//!        config · observability · lifecycle (cross-cutting)
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use pulse::config::{load_config, PulseConfig};
use pulse::lifecycle::{signals, spawn_snapshot_task, Shutdown};
use pulse::observability::{logging, metrics};
use pulse::storage::{MemoryStore, Storage};
use pulse::HttpServer;

#[derive(Debug, Parser)]
#[command(name = "pulse", version, about = "Observability backend for logs, metrics and traces")]
struct Cli {
    /// Path to a TOML config file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => PulseConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "pulse starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        snapshot = ?config.storage.snapshot_path,
        tick_ms = config.stream.tick_ms,
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

    let limits = config.query.limits();
    let store: Arc<dyn Storage> = match &config.storage.snapshot_path {
        Some(path) => Arc::new(MemoryStore::open(path, limits)?),
        None => Arc::new(MemoryStore::new(limits)),
    };

    let shutdown = Shutdown::new();
    tokio::spawn(signals::trigger_on_ctrl_c(shutdown.clone()));

    let snapshots = (config.storage.snapshot_path.is_some() && config.storage.flush_interval_secs > 0).then(|| {
        spawn_snapshot_task(
            store.clone(),
            Duration::from_secs(config.storage.flush_interval_secs),
            &shutdown,
        )
    });

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(&config, store.clone(), shutdown.clone());
    let drain = Duration::from_secs(config.timeouts.shutdown_secs);
    let serve = server.run(listener);
    tokio::pin!(serve);
    tokio::select! {
        result = &mut serve => result?,
        _ = async {
            shutdown.wait().await;
            tokio::time::sleep(drain).await;
        } => tracing::warn!(grace_secs = drain.as_secs(), "Drain deadline reached, forcing exit"),
    }

    if let Some(task) = snapshots {
        let _ = task.await;
    }
    if let Err(e) = store.flush() {
        tracing::error!(error = %e, "Final snapshot failed");
    }
    store.close();

    tracing::info!("Shutdown complete");
    Ok(())
}
