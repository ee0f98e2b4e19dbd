//! Collector + webhook server binary.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use argus_detector::{ConnectionMonitor, ViolationDetector};
use argus_enrich::GeoIpService;
use argus_notify::Dispatcher;
use argus_server::api;
use argus_server::messenger::LogMessenger;
use argus_server::{AppConfig, AppState, ServerError};
use argus_store::LedgerStore;
use argus_store_memory::MemoryLedgerStore;
use argus_store_postgres::PostgresLedgerStore;
use argus_sync::{RestControlPlane, SyncWorker};

#[derive(Parser)]
#[command(name = "argus-server", about = "Argus collector and webhook server")]
struct Cli {
    /// Path to the server TOML configuration.
    #[arg(long, env = "ARGUS_CONFIG", default_value = "argus.toml")]
    config: PathBuf,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Connect the ledger store, falling back to degraded in-memory mode when
/// no database is configured or reachable.
async fn connect_store(config: &AppConfig) -> (Arc<dyn LedgerStore>, bool) {
    let Some(pg) = &config.database else {
        warn!("no database configured; running with the in-memory store");
        return (Arc::new(MemoryLedgerStore::new()), false);
    };
    match PostgresLedgerStore::connect(pg).await {
        Ok(store) => {
            info!("ledger database connected");
            (Arc::new(store), true)
        }
        Err(e) => {
            warn!(error = %e, "database unavailable; degrading to the in-memory store");
            (Arc::new(MemoryLedgerStore::new()), false)
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    init_tracing();
    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)?;

    let (store, database_connected) = connect_store(&config).await;

    let enricher = Arc::new(
        GeoIpService::new(config.geoip.clone())
            .map_err(|e| ServerError::Config(e.to_string()))?,
    );
    let monitor = Arc::new(ConnectionMonitor::new(store.clone()));
    let detector = Arc::new(ViolationDetector::new(store.clone(), enricher));
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::new(LogMessenger),
        config.notifications.clone(),
    ));

    // Sync worker: periodic pulls when a panel is configured, event-driven
    // mirroring either way.
    let sync = match &config.control_plane {
        Some(cp) => {
            let client = RestControlPlane::new(cp.clone())
                .map_err(|e| ServerError::Config(e.to_string()))?;
            Arc::new(SyncWorker::new(
                store.clone(),
                Arc::new(client),
                Duration::from_secs(config.sync.sync_interval_seconds),
            ))
        }
        None => Arc::new(SyncWorker::event_only(store.clone())),
    };
    let _sync_task = sync.clone().spawn();

    // Throttle sweeper: evicts violation cooldowns older than an hour.
    let sweeper_dispatcher = dispatcher.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(600)).await;
            sweeper_dispatcher.sweep_throttle();
        }
    });

    let state = AppState {
        store,
        monitor,
        detector,
        dispatcher,
        sync: Some(sync),
        webhook_secret: config.webhook.webhook_secret.clone(),
        database_connected,
    };

    let addr = format!("{}:{}", config.server.host, config.server.webhook_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "listening");

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;

    Ok(())
}
