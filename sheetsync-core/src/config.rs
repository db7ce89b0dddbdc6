//! Pipeline configuration.
//!
//! Configuration is loaded from environment variables with the same defaults
//! the service has always run with. Everything the pipeline needs to know
//! about sheet names and columns travels in [`SyncConfig`]; there is no
//! process-wide state.

use crate::constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_CREDENTIALS_FILE, DEFAULT_DESTINATION_SHEET,
    DEFAULT_EMAIL_COLUMN, DEFAULT_ORACLE_TIMEOUT_SECS, DEFAULT_ORACLE_URL,
    DEFAULT_POLL_INTERVAL_SECS, DEFAULT_READ_RANGE, DEFAULT_SHEETS_API_BASE,
    DEFAULT_SOURCE_SHEETS,
};
use crate::error::ConfigError;
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the sheet verification pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Spreadsheet holding every source and destination table
    pub spreadsheet_id: String,

    /// Service account key file used to obtain bearer tokens
    pub credentials_file: PathBuf,

    /// Header naming the column that holds the address to verify
    pub email_column: String,

    /// Table that receives verified rows
    pub destination_sheet: String,

    /// Tables checked on every tick, in order
    pub source_sheets: Vec<String>,

    /// Sleep between the end of one tick and the start of the next
    /// (default: 60 seconds)
    pub poll_interval: Duration,

    /// Rows verified concurrently per batch (default: 100)
    pub batch_size: usize,

    /// Range read from each source table (default: A:Z)
    pub read_range: String,

    /// Base URL of the verification oracle
    pub oracle_url: String,

    /// Per-call oracle timeout (default: 30 seconds)
    pub oracle_timeout: Duration,

    /// Base URL of the Sheets REST API
    pub sheets_api_base: String,

    /// Run a single tick and exit
    pub run_once: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: String::new(),
            credentials_file: PathBuf::from(DEFAULT_CREDENTIALS_FILE),
            email_column: DEFAULT_EMAIL_COLUMN.to_string(),
            destination_sheet: DEFAULT_DESTINATION_SHEET.to_string(),
            source_sheets: DEFAULT_SOURCE_SHEETS.iter().map(|s| s.to_string()).collect(),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            batch_size: DEFAULT_BATCH_SIZE,
            read_range: DEFAULT_READ_RANGE.to_string(),
            oracle_url: DEFAULT_ORACLE_URL.to_string(),
            oracle_timeout: Duration::from_secs(DEFAULT_ORACLE_TIMEOUT_SECS),
            sheets_api_base: DEFAULT_SHEETS_API_BASE.to_string(),
            run_once: false,
        }
    }
}

impl SyncConfig {
    /// Create SyncConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `SHEETSYNC_SPREADSHEET_ID`: Spreadsheet to reconcile (required, checked by `validate`)
    /// - `SHEETSYNC_CREDENTIALS_FILE`: Service account key file (default: credentials.json)
    /// - `SHEETSYNC_EMAIL_COLUMN`: Header of the address column (default: email)
    /// - `SHEETSYNC_DESTINATION_SHEET`: Table receiving verified rows (default: VERIFIED)
    /// - `SHEETSYNC_SOURCE_SHEETS`: Comma-separated tables to check
    /// - `SHEETSYNC_POLL_INTERVAL_SECS`: Sleep between ticks (default: 60)
    /// - `SHEETSYNC_BATCH_SIZE`: Concurrent oracle calls per batch (default: 100)
    /// - `SHEETSYNC_READ_RANGE`: Column range read per table (default: A:Z)
    /// - `SHEETSYNC_ORACLE_URL`: Verification endpoint
    /// - `SHEETSYNC_ORACLE_TIMEOUT_SECS`: Per-call oracle timeout (default: 30)
    /// - `SHEETSYNC_SHEETS_API_BASE`: Sheets API base URL
    /// - `SHEETSYNC_RUN_ONCE`: "true" to run a single tick (default: false)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let source_sheets = std::env::var("SHEETSYNC_SOURCE_SHEETS")
            .ok()
            .map(|s| parse_list(&s))
            .unwrap_or(defaults.source_sheets);

        let poll_interval = std::env::var("SHEETSYNC_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.poll_interval);

        let batch_size = std::env::var("SHEETSYNC_BATCH_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.batch_size);

        let oracle_timeout = std::env::var("SHEETSYNC_ORACLE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.oracle_timeout);

        let run_once = std::env::var("SHEETSYNC_RUN_ONCE")
            .ok()
            .map(|s| s.to_lowercase() == "true" || s == "1")
            .unwrap_or(false);

        Self {
            spreadsheet_id: std::env::var("SHEETSYNC_SPREADSHEET_ID").unwrap_or_default(),
            credentials_file: std::env::var("SHEETSYNC_CREDENTIALS_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.credentials_file),
            email_column: std::env::var("SHEETSYNC_EMAIL_COLUMN")
                .unwrap_or(defaults.email_column),
            destination_sheet: std::env::var("SHEETSYNC_DESTINATION_SHEET")
                .unwrap_or(defaults.destination_sheet),
            source_sheets,
            poll_interval,
            batch_size,
            read_range: std::env::var("SHEETSYNC_READ_RANGE").unwrap_or(defaults.read_range),
            oracle_url: std::env::var("SHEETSYNC_ORACLE_URL").unwrap_or(defaults.oracle_url),
            oracle_timeout,
            sheets_api_base: std::env::var("SHEETSYNC_SHEETS_API_BASE")
                .unwrap_or(defaults.sheets_api_base),
            run_once,
        }
    }

    /// Create a configuration for development/testing with a short interval
    /// and small batches.
    pub fn development() -> Self {
        Self {
            spreadsheet_id: "development".to_string(),
            poll_interval: Duration::from_secs(5),
            batch_size: 10,
            oracle_timeout: Duration::from_secs(5),
            ..Self::default()
        }
    }

    /// Check the configuration for values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.spreadsheet_id.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "spreadsheet_id".to_string(),
            });
        }
        if self.email_column.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "email_column".to_string(),
            });
        }
        if self.source_sheets.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "source_sheets".to_string(),
            });
        }
        if self.batch_size == 0 {
            return Err(invalid("batch_size", "0", "must be at least 1"));
        }
        if self.poll_interval.is_zero() {
            return Err(invalid("poll_interval", "0", "must be at least 1 second"));
        }
        if self.oracle_timeout.is_zero() {
            return Err(invalid("oracle_timeout", "0", "must be at least 1 second"));
        }
        if self.source_sheets.contains(&self.destination_sheet) {
            return Err(invalid(
                "source_sheets",
                &self.destination_sheet,
                "destination table cannot also be a source",
            ));
        }
        Ok(())
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
