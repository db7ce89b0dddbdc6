//! Sheet Sync Background Task
//!
//! Every tick walks the configured source tables in order and, for each one,
//! verifies its addresses and relocates the resolved rows. Failures are
//! contained at the table boundary: a table that errors is logged and left
//! for the next tick, and the remaining tables still run.
//!
//! Tables are processed one at a time. Two tables relocating concurrently
//! would append to the shared destination at once.

use crate::run::{TableRunError, TableRunReport, TableRunner};
use sheetsync_core::{ErrorKind, SyncConfig, TableBackend, VerificationOracle};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::Instrument;
use uuid::Uuid;

// ============================================================================
// METRICS
// ============================================================================

/// Counters for sync activity since startup.
#[derive(Debug, Default)]
pub struct SyncMetrics {
    /// Ticks completed
    pub ticks: AtomicU64,

    /// Table runs that completed
    pub tables_processed: AtomicU64,

    /// Table runs that stopped on an error
    pub tables_failed: AtomicU64,

    /// Rows sent to the oracle
    pub rows_verified: AtomicU64,

    /// Rows appended to the destination
    pub rows_moved: AtomicU64,

    /// Rows deleted from source tables
    pub rows_deleted: AtomicU64,

    /// Rows left in place for lack of a definite verdict
    pub rows_indeterminate: AtomicU64,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current snapshot of all metrics.
    pub fn snapshot(&self) -> SyncMetricsSnapshot {
        SyncMetricsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            tables_processed: self.tables_processed.load(Ordering::Relaxed),
            tables_failed: self.tables_failed.load(Ordering::Relaxed),
            rows_verified: self.rows_verified.load(Ordering::Relaxed),
            rows_moved: self.rows_moved.load(Ordering::Relaxed),
            rows_deleted: self.rows_deleted.load(Ordering::Relaxed),
            rows_indeterminate: self.rows_indeterminate.load(Ordering::Relaxed),
        }
    }

    fn record_report(&self, report: &TableRunReport) {
        self.tables_processed.fetch_add(1, Ordering::Relaxed);
        self.rows_verified
            .fetch_add(report.verified as u64, Ordering::Relaxed);
        self.rows_moved
            .fetch_add(report.moved as u64, Ordering::Relaxed);
        self.rows_deleted
            .fetch_add(report.deleted as u64, Ordering::Relaxed);
        self.rows_indeterminate
            .fetch_add(report.indeterminate as u64, Ordering::Relaxed);
    }

    fn record_failure(&self, err: &TableRunError) {
        self.tables_failed.fetch_add(1, Ordering::Relaxed);
        self.rows_moved
            .fetch_add(err.moved as u64, Ordering::Relaxed);
    }
}

/// Snapshot of sync metrics at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncMetricsSnapshot {
    pub ticks: u64,
    pub tables_processed: u64,
    pub tables_failed: u64,
    pub rows_verified: u64,
    pub rows_moved: u64,
    pub rows_deleted: u64,
    pub rows_indeterminate: u64,
}

// ============================================================================
// SYNC JOB
// ============================================================================

/// Result of one tick.
#[derive(Debug, Clone)]
pub struct TickSummary {
    pub tick_id: Uuid,
    pub reports: Vec<TableRunReport>,
    pub failures: Vec<TableRunError>,
}

/// Runs ticks over the configured source tables.
#[derive(Debug)]
pub struct SyncJob {
    runner: TableRunner,
    sources: Vec<String>,
    metrics: Arc<SyncMetrics>,
}

impl SyncJob {
    pub fn new(
        backend: Arc<dyn TableBackend>,
        oracle: Arc<dyn VerificationOracle>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            runner: TableRunner::new(backend, oracle, config),
            sources: config.source_sheets.clone(),
            metrics: Arc::new(SyncMetrics::new()),
        }
    }

    pub fn metrics(&self) -> Arc<SyncMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Process every source table once.
    pub async fn run_tick(&self) -> TickSummary {
        let tick_id = Uuid::now_v7();
        let mut summary = TickSummary {
            tick_id,
            reports: Vec::new(),
            failures: Vec::new(),
        };

        for table in &self.sources {
            let span = tracing::info_span!("table_run", table = %table, tick_id = %tick_id);
            match self.runner.run(table).instrument(span).await {
                Ok(report) => {
                    if report.moved > 0 || report.deleted > 0 {
                        tracing::info!(
                            table = %table,
                            moved = report.moved,
                            deleted = report.deleted,
                            indeterminate = report.indeterminate,
                            "Table synced"
                        );
                    } else {
                        tracing::trace!(table = %table, "Table synced with no changes");
                    }
                    self.metrics.record_report(&report);
                    summary.reports.push(report);
                }
                Err(err) => {
                    log_failure(&err);
                    self.metrics.record_failure(&err);
                    summary.failures.push(err);
                }
            }
        }

        self.metrics.ticks.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            tick_id = %tick_id,
            tables = summary.reports.len(),
            failed = summary.failures.len(),
            "Tick completed"
        );
        summary
    }
}

fn log_failure(err: &TableRunError) {
    match err.kind() {
        ErrorKind::BackendUnavailable => tracing::warn!(
            table = %err.table,
            stage = err.stage.as_str(),
            kind = %err.kind(),
            moved = err.moved,
            error = %err.source,
            "Table run failed, retrying next tick"
        ),
        _ => tracing::error!(
            table = %err.table,
            stage = err.stage.as_str(),
            kind = %err.kind(),
            moved = err.moved,
            error = %err.source,
            "Table run failed"
        ),
    }
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Background task that runs a tick, sleeps for the polling interval, and
/// repeats until shutdown.
///
/// The first tick starts immediately. Shutdown is only observed between
/// ticks, so a tick in progress always finishes its table. Dropping the
/// sender counts as shutdown. With `config.run_once` the task returns after
/// the first tick.
///
/// # Returns
///
/// Metrics collected during the task's lifetime
pub async fn sync_task(
    backend: Arc<dyn TableBackend>,
    oracle: Arc<dyn VerificationOracle>,
    config: SyncConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<SyncMetrics> {
    let job = SyncJob::new(backend, oracle, &config);
    let metrics = job.metrics();

    tracing::info!(
        poll_interval_secs = config.poll_interval.as_secs(),
        batch_size = config.batch_size,
        sources = ?config.source_sheets,
        destination = %config.destination_sheet,
        run_once = config.run_once,
        "Sheet sync task started"
    );

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        job.run_tick().await;

        if config.run_once {
            break;
        }
        if wait_or_shutdown(&mut shutdown_rx, config.poll_interval).await {
            tracing::info!("Sheet sync task shutting down");
            break;
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        ticks = snapshot.ticks,
        tables_processed = snapshot.tables_processed,
        tables_failed = snapshot.tables_failed,
        rows_verified = snapshot.rows_verified,
        rows_moved = snapshot.rows_moved,
        rows_deleted = snapshot.rows_deleted,
        rows_indeterminate = snapshot.rows_indeterminate,
        "Sheet sync task completed"
    );

    metrics
}

/// Sleep for `period`. Returns `true` if shutdown was requested first.
async fn wait_or_shutdown(shutdown_rx: &mut watch::Receiver<bool>, period: Duration) -> bool {
    let sleep = tokio::time::sleep(period);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    return true;
                }
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use sheetsync_core::{BackendError, Verdict};
    use sheetsync_test_utils::{
        gmail_scenario, grid, BackendCall, MemoryBackend, Operation, ScriptedOracle,
    };
    use std::collections::HashSet;

    fn config(sources: &[&str]) -> SyncConfig {
        SyncConfig {
            source_sheets: sources.iter().map(|s| s.to_string()).collect(),
            ..SyncConfig::development()
        }
    }

    #[test]
    fn test_metrics_snapshot_starts_at_zero() {
        assert_eq!(SyncMetrics::new().snapshot(), SyncMetricsSnapshot::default());
    }

    #[tokio::test]
    async fn test_tick_isolates_table_failures() {
        let (backend, oracle) = gmail_scenario();
        backend.insert_table("AOL", grid(&[&["name", "email"], &["D", "d@x.com"]]));
        backend.fail_on(
            Operation::ReadRows,
            Some("AOL"),
            BackendError::unavailable("read_rows", "503"),
        );
        let job = SyncJob::new(
            Arc::new(backend),
            Arc::new(oracle),
            &config(&["AOL", "OUTLOOK", "GMAIL"]),
        );

        let summary = job.run_tick().await;

        assert_eq!(summary.reports.len(), 1);
        assert_eq!(summary.reports[0].table, "GMAIL");
        let failed: Vec<&str> = summary.failures.iter().map(|f| f.table.as_str()).collect();
        assert_eq!(failed, vec!["AOL", "OUTLOOK"]);

        let snapshot = job.metrics().snapshot();
        assert_eq!(snapshot.ticks, 1);
        assert_eq!(snapshot.tables_processed, 1);
        assert_eq!(snapshot.tables_failed, 2);
        assert_eq!(snapshot.rows_moved, 1);
        assert_eq!(snapshot.rows_deleted, 2);
    }

    #[tokio::test]
    async fn test_second_tick_is_idempotent() {
        let (backend, oracle) = gmail_scenario();
        let backend = Arc::new(backend);
        let oracle = Arc::new(oracle);
        let job = SyncJob::new(backend.clone(), oracle.clone(), &config(&["GMAIL"]));

        job.run_tick().await;
        backend.clear_calls();
        let second = job.run_tick().await;

        assert_eq!(second.reports[0].moved, 0);
        assert_eq!(second.reports[0].deleted, 0);
        assert_eq!(backend.data_rows("VERIFIED").len(), 1);
        // Only the blank-address row is left, so the second tick only reads.
        assert_eq!(
            backend.calls(),
            vec![BackendCall::ReadRows {
                table: "GMAIL".to_string()
            }]
        );
        assert_eq!(oracle.call_count(), 2);
        assert_eq!(
            oracle.distinct_calls(),
            HashSet::from(["a@x.com".to_string(), "b@x.com".to_string()])
        );
    }

    #[tokio::test]
    async fn test_run_once_stops_after_first_tick() {
        let (backend, oracle) = gmail_scenario();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let config = SyncConfig {
            run_once: true,
            ..config(&["GMAIL"])
        };

        let metrics = sync_task(Arc::new(backend), Arc::new(oracle), config, shutdown_rx).await;

        assert_eq!(metrics.snapshot().ticks, 1);
    }

    #[tokio::test]
    async fn test_shutdown_before_start_runs_nothing() {
        let (backend, _) = gmail_scenario();
        let oracle = ScriptedOracle::new().with_default(Verdict::Exists);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        shutdown_tx.send(true).unwrap();

        let metrics = sync_task(
            Arc::new(backend),
            Arc::new(oracle),
            config(&["GMAIL"]),
            shutdown_rx,
        )
        .await;

        assert_eq!(metrics.snapshot().ticks, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_between_ticks() {
        let backend = Arc::new(MemoryBackend::new().with_table("GMAIL", grid(&[&["email"]])));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(sync_task(
            backend,
            Arc::new(ScriptedOracle::new()),
            config(&["GMAIL"]),
            shutdown_rx,
        ));

        // development() polls every 5 seconds: ticks at t=0, 5, 10.
        tokio::time::sleep(Duration::from_secs(12)).await;
        shutdown_tx.send(true).unwrap();
        let metrics = handle.await.unwrap();

        assert_eq!(metrics.snapshot().ticks, 3);
    }

    #[tokio::test]
    async fn test_dropped_sender_stops_task() {
        let backend = Arc::new(MemoryBackend::new().with_table("GMAIL", grid(&[&["email"]])));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let config = SyncConfig {
            poll_interval: Duration::from_secs(3600),
            ..config(&["GMAIL"])
        };
        let handle = tokio::spawn(sync_task(
            backend,
            Arc::new(ScriptedOracle::new()),
            config,
            shutdown_rx,
        ));

        drop(shutdown_tx);
        let metrics = handle.await.unwrap();
        assert!(metrics.snapshot().ticks <= 1);
    }
}
