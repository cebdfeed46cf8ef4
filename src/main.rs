//! Settlement ledger service
//!
//! ```text
//! ┌──────────┐    ┌──────────┐    ┌──────────────┐
//! │  Config  │───▶│ Postgres │───▶│ ExpirySweeper│
//! │  (YAML)  │    │ (schema) │    │  (periodic)  │
//! └──────────┘    └──────────┘    └──────────────┘
//! ```
//!
//! Runs until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use settlement_ledger::config::AppConfig;
use settlement_ledger::db::Database;
use settlement_ledger::persistence::{LedgerStore, PgLedgerStore};
use settlement_ledger::settlement::SettlementCoordinator;
use settlement_ledger::transfer::ExpirySweeper;

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let app_config = AppConfig::load(&env)?;
    let _log_guard = settlement_ledger::logging::init_logging(&app_config);

    tracing::info!("Starting settlement ledger in {} mode", env);

    let db = Database::connect(&app_config.postgres_url, app_config.max_connections)
        .await
        .context("Failed to connect to PostgreSQL")?;
    db.health_check().await.context("Database health check failed")?;
    db.migrate().await.context("Failed to initialize schema")?;

    let store: Arc<dyn LedgerStore> = Arc::new(PgLedgerStore::new(db.pool().clone()));
    let coordinator = Arc::new(SettlementCoordinator::new(
        store.clone(),
        app_config.settlement.clone(),
    ));
    tracing::info!(
        store = store.name(),
        transfer_ttl_secs = app_config.settlement.transfer_ttl_secs,
        "Settlement coordinator ready"
    );

    let sweeper = if app_config.expiry_sweep.enabled {
        let sweeper = ExpirySweeper::new(coordinator.clone(), app_config.expiry_sweep.clone());
        Some(tokio::spawn(async move {
            sweeper.run().await;
        }))
    } else {
        tracing::info!("Expiry sweeper disabled");
        None
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");

    if let Some(handle) = sweeper {
        handle.abort();
    }
    db.pool().close().await;
    Ok(())
}
