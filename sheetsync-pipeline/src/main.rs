//! SHEETSYNC Entry Point
//!
//! Bootstraps configuration, builds the Sheets and oracle clients, and runs
//! the sync task until Ctrl-C, or for a single tick in run-once mode.

use std::sync::Arc;

use sheetsync_clients::{EmailOracleClient, GoogleSheetsClient};
use sheetsync_core::{SyncConfig, SyncResult, TableBackend, VerificationOracle};
use sheetsync_pipeline::{check_tables, init_tracing, sync_task, TelemetryConfig};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> SyncResult<()> {
    init_tracing(&TelemetryConfig::default())?;

    let config = SyncConfig::from_env();
    config.validate()?;

    let backend: Arc<dyn TableBackend> = Arc::new(GoogleSheetsClient::from_config(&config)?);
    let oracle: Arc<dyn VerificationOracle> = Arc::new(EmailOracleClient::from_config(&config)?);

    tracing::info!(
        spreadsheet_id = %config.spreadsheet_id,
        oracle_url = %config.oracle_url,
        "Starting SHEETSYNC"
    );
    if let Err(e) = check_tables(backend.as_ref(), &config).await {
        tracing::warn!(error = %e, "Could not list tables at startup");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut task = tokio::spawn(sync_task(backend, oracle, config, shutdown_rx));

    let finished = tokio::select! {
        result = &mut task => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
            task.await
        }
    };

    if let Err(e) = finished {
        tracing::error!(error = %e, "Sheet sync task aborted");
    }
    Ok(())
}
