//! Default values shared across SHEETSYNC crates.

// ============================================================================
// PIPELINE DEFAULTS
// ============================================================================

/// Seconds to sleep between ticks.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Rows verified concurrently per batch.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Header of the column holding the address to verify.
pub const DEFAULT_EMAIL_COLUMN: &str = "email";

/// Table receiving verified rows.
pub const DEFAULT_DESTINATION_SHEET: &str = "VERIFIED";

/// Tables checked each tick.
pub const DEFAULT_SOURCE_SHEETS: &[&str] = &["OFFICE", "GMAIL", "AOL", "OUTLOOK", "HOTMAIL"];

/// Range read from each source table.
pub const DEFAULT_READ_RANGE: &str = "A:Z";

// ============================================================================
// ORACLE DEFAULTS
// ============================================================================

pub const DEFAULT_ORACLE_URL: &str = "https://headless-webfix.vercel.app/verify-email";

/// Per-call oracle timeout.
pub const DEFAULT_ORACLE_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// BACKEND DEFAULTS
// ============================================================================

pub const DEFAULT_SHEETS_API_BASE: &str = "https://sheets.googleapis.com";

pub const DEFAULT_CREDENTIALS_FILE: &str = "credentials.json";

/// OAuth scope requested for the service account.
pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

/// Lifetime of the signed assertion and of the issued token.
pub const TOKEN_LIFETIME_SECS: i64 = 3600;

/// Tokens are treated as expired this long before their stated expiry.
pub const TOKEN_REFRESH_SKEW_SECS: i64 = 60;

/// Timeout for calls against the tabular backend.
pub const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 30;
