//! Error types for SHEETSYNC operations

use thiserror::Error;

/// Tabular backend errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// Transport, authentication or throttling failure. Retried next tick.
    #[error("Backend unavailable during {operation}: {reason}")]
    Unavailable { operation: String, reason: String },

    /// The backend answered with something we could not interpret.
    #[error("Unexpected backend response during {operation}: {reason}")]
    Protocol { operation: String, reason: String },

    #[error("Table not found: {table}")]
    NotFound { table: String },
}

impl BackendError {
    pub fn unavailable(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn protocol(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Protocol {
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("No column with header '{column}' in table {table}")]
    MissingColumn { table: String, column: String },

    #[error("Failed to load credentials from {path}: {reason}")]
    Credentials { path: String, reason: String },
}

/// Coarse error category used for logging and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BackendUnavailable,
    BackendProtocol,
    Configuration,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::BackendUnavailable => "backend_unavailable",
            ErrorKind::BackendProtocol => "backend_protocol",
            ErrorKind::Configuration => "configuration",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Master error type for a table run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl SyncError {
    /// Classify this error. A missing table counts as misconfiguration.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Backend(BackendError::Unavailable { .. }) => ErrorKind::BackendUnavailable,
            SyncError::Backend(BackendError::Protocol { .. }) => ErrorKind::BackendProtocol,
            SyncError::Backend(BackendError::NotFound { .. }) | SyncError::Config(_) => {
                ErrorKind::Configuration
            }
        }
    }
}

/// Result type alias for SHEETSYNC operations.
pub type SyncResult<T> = Result<T, SyncError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_display_unavailable() {
        let err = BackendError::unavailable("read_rows", "connection reset");
        let msg = format!("{}", err);
        assert!(msg.contains("read_rows"));
        assert!(msg.contains("connection reset"));
    }

    #[test]
    fn test_missing_column_display() {
        let err = ConfigError::MissingColumn {
            table: "GMAIL".to_string(),
            column: "email".to_string(),
        };
        assert_eq!(
            format!("{}", err),
            "No column with header 'email' in table GMAIL"
        );
    }

    #[test]
    fn test_error_kind_classification() {
        let unavailable: SyncError = BackendError::unavailable("append_rows", "503").into();
        assert_eq!(unavailable.kind(), ErrorKind::BackendUnavailable);

        let protocol: SyncError = BackendError::protocol("read_rows", "bad json").into();
        assert_eq!(protocol.kind(), ErrorKind::BackendProtocol);

        let not_found: SyncError = BackendError::NotFound {
            table: "MISSING".to_string(),
        }
        .into();
        assert_eq!(not_found.kind(), ErrorKind::Configuration);

        let config: SyncError = ConfigError::MissingRequired {
            field: "spreadsheet_id".to_string(),
        }
        .into();
        assert_eq!(config.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_error_kind_as_str() {
        assert_eq!(ErrorKind::BackendUnavailable.to_string(), "backend_unavailable");
        assert_eq!(ErrorKind::Configuration.as_str(), "configuration");
    }
}
