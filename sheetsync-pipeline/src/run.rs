//! One verification pass over one source table.
//!
//! A run reads the table, verifies every addressed row, derives a
//! [`RelocationPlan`] and applies it. Any error ends the run for that table
//! only; the caller decides what happens next.

use crate::relocator::{RelocationError, RelocationStep, RowRelocator};
use crate::verifier::BatchVerifier;
use sheetsync_core::{
    range_width, split_header, BackendError, ConfigError, ErrorKind, RelocationPlan, SyncConfig,
    SyncError, TableBackend, TableInfo, VerificationOracle,
};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// REPORTS AND ERRORS
// ============================================================================

/// Stage a table run was in when it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Read,
    Header,
    Append,
    Delete,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Read => "read",
            Stage::Header => "header",
            Stage::Append => "append",
            Stage::Delete => "delete",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters for one completed table run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableRunReport {
    pub table: String,
    /// Data rows read, header excluded
    pub rows_read: usize,
    /// Rows skipped for a blank address
    pub skipped: usize,
    /// Rows sent to the oracle
    pub verified: usize,
    pub moved: usize,
    pub deleted: usize,
    pub indeterminate: usize,
}

/// A table run that stopped early.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Table {table} failed at {stage}: {source}")]
pub struct TableRunError {
    pub table: String,
    pub stage: Stage,
    /// Rows already appended to the destination before the failure
    pub moved: usize,
    pub source: SyncError,
}

impl TableRunError {
    fn new(table: &str, stage: Stage, source: impl Into<SyncError>) -> Self {
        Self {
            table: table.to_string(),
            stage,
            moved: 0,
            source: source.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }

    fn from_relocation(table: &str, err: RelocationError) -> Self {
        let stage = match err.step {
            RelocationStep::Append => Stage::Append,
            RelocationStep::Delete => Stage::Delete,
        };
        Self {
            moved: err.moved,
            ..Self::new(table, stage, err.source)
        }
    }
}

// ============================================================================
// TABLE RUNNER
// ============================================================================

/// Runs the read, verify, plan, relocate sequence for source tables.
#[derive(Clone)]
pub struct TableRunner {
    backend: Arc<dyn TableBackend>,
    verifier: BatchVerifier,
    relocator: RowRelocator,
    email_column: String,
}

impl TableRunner {
    pub fn new(
        backend: Arc<dyn TableBackend>,
        oracle: Arc<dyn VerificationOracle>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            verifier: BatchVerifier::new(oracle, config.batch_size),
            relocator: RowRelocator::new(Arc::clone(&backend), config.destination_sheet.clone()),
            backend,
            email_column: config.email_column.clone(),
        }
    }

    /// Run one pass over `table`.
    pub async fn run(&self, table: &str) -> Result<TableRunReport, TableRunError> {
        let mut report = TableRunReport {
            table: table.to_string(),
            ..Default::default()
        };

        let grid = self
            .backend
            .read_rows(table)
            .await
            .map_err(|e| TableRunError::new(table, Stage::Read, e))?;

        let Some((header, rows)) = split_header(grid) else {
            tracing::debug!(table, "Table is empty");
            return Ok(report);
        };

        let email_index = header.position(&self.email_column).ok_or_else(|| {
            TableRunError::new(
                table,
                Stage::Header,
                ConfigError::MissingColumn {
                    table: table.to_string(),
                    column: self.email_column.clone(),
                },
            )
        })?;

        report.rows_read = rows.len();
        if rows.is_empty() {
            tracing::debug!(table, "Table has no data rows");
            return Ok(report);
        }

        let outcomes = self.verifier.verify(&rows, email_index).await;
        report.verified = outcomes.len();
        report.skipped = rows.len() - outcomes.len();

        let plan = RelocationPlan::from_outcomes(&outcomes);
        report.indeterminate = plan.indeterminate;

        tracing::debug!(
            table,
            verified = report.verified,
            moves = plan.moves.len(),
            deletions = plan.deletions.len(),
            indeterminate = plan.indeterminate,
            "Relocation planned"
        );

        let applied = self
            .relocator
            .apply(table, &plan)
            .await
            .map_err(|e| TableRunError::from_relocation(table, e))?;
        report.moved = applied.moved;
        report.deleted = applied.deleted;

        Ok(report)
    }
}

impl std::fmt::Debug for TableRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableRunner")
            .field("verifier", &self.verifier)
            .field("relocator", &self.relocator)
            .field("email_column", &self.email_column)
            .finish()
    }
}

// ============================================================================
// STARTUP CHECK
// ============================================================================

/// Problems with the configured tables found before the first tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableCheck {
    /// Configured tables the spreadsheet does not have
    pub missing: Vec<String>,
    /// Source tables with columns past the configured read range
    pub truncated: Vec<TableInfo>,
}

impl TableCheck {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.truncated.is_empty()
    }
}

/// Compare the configured tables with the spreadsheet and log a warning
/// for each problem.
///
/// A source table wider than `read_range` loses its extra columns when a
/// verified row is copied to the destination and deleted from the source.
pub async fn check_tables(
    backend: &dyn TableBackend,
    config: &SyncConfig,
) -> Result<TableCheck, BackendError> {
    let tables = backend.list_tables().await?;
    let by_name: HashMap<&str, &TableInfo> =
        tables.iter().map(|t| (t.name.as_str(), t)).collect();
    let width = range_width(&config.read_range);
    let mut check = TableCheck::default();

    for name in &config.source_sheets {
        match by_name.get(name.as_str()) {
            None => check.missing.push(name.clone()),
            Some(info) => {
                if let Some(width) = width.filter(|w| info.column_count > *w) {
                    tracing::warn!(
                        table = %name,
                        columns = info.column_count,
                        read_range = %config.read_range,
                        readable = width,
                        "Table is wider than the read range; extra columns are not copied"
                    );
                    check.truncated.push((*info).clone());
                }
            }
        }
    }
    if !by_name.contains_key(config.destination_sheet.as_str()) {
        check.missing.push(config.destination_sheet.clone());
    }

    for name in &check.missing {
        tracing::warn!(table = %name, "Configured table does not exist");
    }
    Ok(check)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use sheetsync_core::{BackendError, Verdict};
    use sheetsync_test_utils::{gmail_scenario, grid, MemoryBackend, Operation, ScriptedOracle};

    fn wide_row(cells: usize) -> Vec<String> {
        (0..cells).map(|i| format!("c{}", i)).collect()
    }

    fn runner(backend: Arc<MemoryBackend>, oracle: ScriptedOracle) -> TableRunner {
        TableRunner::new(backend, Arc::new(oracle), &SyncConfig::development())
    }

    #[tokio::test]
    async fn test_gmail_run_report() {
        let (backend, oracle) = gmail_scenario();
        let backend = Arc::new(backend);

        let report = runner(backend.clone(), oracle).run("GMAIL").await.unwrap();

        assert_eq!(
            report,
            TableRunReport {
                table: "GMAIL".to_string(),
                rows_read: 3,
                skipped: 1,
                verified: 2,
                moved: 1,
                deleted: 2,
                indeterminate: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_missing_email_column() {
        let backend = Arc::new(
            MemoryBackend::new().with_table("AOL", grid(&[&["name", "mail"], &["A", "a@x.com"]])),
        );

        let err = runner(backend.clone(), ScriptedOracle::new())
            .run("AOL")
            .await
            .unwrap_err();

        assert_eq!(err.stage, Stage::Header);
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(backend.append_calls("VERIFIED").is_empty());
    }

    #[tokio::test]
    async fn test_missing_table_is_configuration() {
        let backend = Arc::new(MemoryBackend::new());
        let err = runner(backend, ScriptedOracle::new())
            .run("HOTMAIL")
            .await
            .unwrap_err();
        assert_eq!(err.stage, Stage::Read);
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_empty_and_header_only_tables() {
        let backend = Arc::new(
            MemoryBackend::new()
                .with_table("EMPTY", Vec::new())
                .with_table("HEADER", grid(&[&["name", "email"]])),
        );
        let oracle = ScriptedOracle::new();
        let runner = runner(backend.clone(), oracle);

        assert_eq!(runner.run("EMPTY").await.unwrap().rows_read, 0);
        assert_eq!(runner.run("HEADER").await.unwrap().rows_read, 0);
        assert_eq!(backend.delete_calls("EMPTY").len(), 0);
    }

    #[tokio::test]
    async fn test_read_failure_stage() {
        let (backend, oracle) = gmail_scenario();
        backend.fail_on(
            Operation::ReadRows,
            Some("GMAIL"),
            BackendError::unavailable("read_rows", "connection reset"),
        );

        let err = runner(Arc::new(backend), oracle)
            .run("GMAIL")
            .await
            .unwrap_err();

        assert_eq!(err.stage, Stage::Read);
        assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
    }

    #[tokio::test]
    async fn test_indeterminate_rows_stay() {
        let (backend, _) = gmail_scenario();
        let backend = Arc::new(backend);
        let oracle = ScriptedOracle::new()
            .with_verdict("a@x.com", Verdict::Exists)
            .with_verdict("b@x.com", Verdict::Indeterminate);

        let report = runner(backend.clone(), oracle).run("GMAIL").await.unwrap();

        assert_eq!(report.indeterminate, 1);
        assert_eq!(backend.delete_calls("GMAIL"), vec![(vec![0], false)]);
        assert_eq!(
            backend.data_rows("GMAIL"),
            grid(&[&["B", ""], &["C", "b@x.com"]])
        );
    }

    #[tokio::test]
    async fn test_check_tables_reports_missing() {
        let (backend, _) = gmail_scenario();
        let config = SyncConfig {
            source_sheets: vec!["GMAIL".to_string(), "HOTMAIL".to_string()],
            ..SyncConfig::development()
        };

        let check = check_tables(&backend, &config).await.unwrap();

        assert_eq!(check.missing, vec!["HOTMAIL".to_string()]);
        assert!(check.truncated.is_empty());
    }

    #[tokio::test]
    async fn test_check_tables_reports_wide_source() {
        let (backend, _) = gmail_scenario();
        let mut header = wide_row(30);
        header[1] = "email".to_string();
        backend.insert_table("WIDE", vec![header]);
        let config = SyncConfig {
            source_sheets: vec!["GMAIL".to_string(), "WIDE".to_string()],
            ..SyncConfig::development()
        };

        let check = check_tables(&backend, &config).await.unwrap();

        assert!(check.missing.is_empty());
        assert_eq!(check.truncated.len(), 1);
        assert_eq!(check.truncated[0].name, "WIDE");
        assert_eq!(check.truncated[0].column_count, 30);

        let widened = SyncConfig {
            read_range: "A:AD".to_string(),
            ..config
        };
        assert!(check_tables(&backend, &widened).await.unwrap().is_clean());
    }

    #[tokio::test]
    async fn test_check_tables_propagates_list_failure() {
        let (backend, _) = gmail_scenario();
        backend.fail_on(
            Operation::ListTables,
            None,
            BackendError::unavailable("list_tables", "503 Service Unavailable"),
        );
        let config = SyncConfig {
            source_sheets: vec!["GMAIL".to_string()],
            ..SyncConfig::development()
        };

        let err = check_tables(&backend, &config).await.unwrap_err();
        assert!(matches!(err, BackendError::Unavailable { .. }));
    }
}
