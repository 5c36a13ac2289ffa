//! Self-parlay service.
//!
//! Entry point. Initialises structured logging, loads configuration,
//! restores the ledger from disk (or starts fresh), then runs the
//! deadline sweeper and the HTTP surface until Ctrl+C.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

use selfparlay::config::AppConfig;
use selfparlay::engine::{Accountant, DeadlineSweeper, ParlayEngine};
use selfparlay::gateway::Gateway;
use selfparlay::server;
use selfparlay::storage::{JsonFileStore, LedgerStore, SharedLedger};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Up before the config so its warnings are emitted.
    init_logging();
    let cfg = AppConfig::load_or_default("config.toml")?;

    let zone = cfg.clock.zone().context("Invalid [clock] timezone")?;
    info!(
        timezone = zone.name(),
        start_balance = cfg.economy.start_balance,
        daily_cap = cfg.economy.daily_stake_cap,
        weekly_cap = cfg.economy.weekly_stake_cap,
        cooldown_minutes = cfg.economy.cooldown_minutes,
        "Self-parlay starting up"
    );

    // -- Restore state ---------------------------------------------------

    let store: Arc<dyn LedgerStore> = Arc::new(JsonFileStore::new(&cfg.storage.path));
    let ledger = Arc::new(SharedLedger::open(store).await?);

    let engine = Arc::new(ParlayEngine::new(
        ledger,
        Accountant::new(cfg.economy.clone(), zone),
    ));
    let gateway = Arc::new(Gateway::new(
        engine.clone(),
        zone,
        cfg.gateway.selection_timeout(),
    ));

    // -- Background tasks ------------------------------------------------

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::new();

    let sweeper = DeadlineSweeper::new(
        engine.clone(),
        zone,
        Duration::from_secs(cfg.scheduler.sweep_interval_secs),
    );
    tasks.push(tokio::spawn(async move {
        sweeper.run(shutdown_rx).await;
        Ok::<(), anyhow::Error>(())
    }));

    if cfg.server.enabled {
        let handle = server::spawn_server(gateway, cfg.server.port, shutdown_tx.subscribe()).await?;
        tasks.push(handle);
    }

    info!("Running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Shutdown signal received.");

    let _ = shutdown_tx.send(true);
    for result in futures::future::join_all(tasks).await {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "Task ended with error"),
            Err(e) => error!(error = %e, "Task panicked"),
        }
    }

    let snapshot = engine.ledger().snapshot().await;
    info!(
        users = snapshot.users.len(),
        active = snapshot.active_parlays().count(),
        "Self-parlay shut down cleanly."
    );
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("selfparlay=info"));

    let json_logging = std::env::var("SELFPARLAY_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
