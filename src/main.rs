use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use geoingest::config::{DEFAULT_SHUTDOWN_TIMEOUT_SECS, PostgresConfig, ServerConfig, StoreKind};
use geoingest::metrics;
use geoingest::postgres::PostgresStore;
use geoingest::server::IngestServer;
use geoingest::store::{MemoryStore, StoreGateway};
use geoingest::telemetry::{self, LogFormat};

#[derive(Parser)]
#[command(about = "TCP ingestion server for GPS telemetry records")]
struct Args {
    #[command(flatten)]
    server: ServerConfig,

    /// Persistence backend
    #[arg(long, value_enum, env = "GEOINGEST_STORE", default_value_t = StoreKind::Postgres)]
    store: StoreKind,

    #[command(flatten)]
    postgres: PostgresConfig,

    /// Upper bound on draining in-flight work at shutdown
    #[arg(long, env = "GEOINGEST_SHUTDOWN_TIMEOUT_SECS", default_value_t = DEFAULT_SHUTDOWN_TIMEOUT_SECS)]
    shutdown_timeout_secs: u64,

    /// Log level filter, overridden by RUST_LOG
    #[arg(long, env = "GEOINGEST_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

async fn build_store(args: &Args) -> Result<Arc<dyn StoreGateway>> {
    match args.store {
        StoreKind::Memory => {
            warn!("using in-memory store; records are lost on exit");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreKind::Postgres => {
            let store = PostgresStore::new(&args.postgres, args.server.workers)
                .context("failed to configure postgres store")?;
            store.ping().await.context("postgres is not reachable")?;
            store
                .ensure_schema()
                .await
                .context("failed to prepare gps_data table")?;
            Ok(Arc::new(store))
        }
    }
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
                    _ = sigterm.recv() => info!("received SIGTERM"),
                }
                return;
            }
            Err(err) => warn!(error = %err, "failed to install SIGTERM handler"),
        }
    }

    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("received SIGINT");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    telemetry::init_telemetry(&args.log_level, args.log_format)
        .context("failed to initialise logging")?;
    metrics::spawn_reporter();

    let store = build_store(&args).await?;
    let server = IngestServer::bind(&args.server, store)
        .await
        .context("failed to start ingest server")?;

    wait_for_signal().await;
    info!("shutting down");

    let timeout = Duration::from_secs(args.shutdown_timeout_secs);
    match tokio::time::timeout(timeout, server.shutdown()).await {
        Ok(processed) => info!(processed, "shutdown complete"),
        Err(_) => warn!(?timeout, "shutdown timed out with work still in flight"),
    }
    Ok(())
}
