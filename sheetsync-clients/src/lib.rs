//! SHEETSYNC Clients - HTTP Collaborators
//!
//! Concrete implementations of the pipeline's collaborator traits:
//!
//! - [`GoogleSheetsClient`]: `TableBackend` over the Sheets v4 REST API,
//!   authenticated with a service account
//! - [`EmailOracleClient`]: `VerificationOracle` over the email existence
//!   endpoint

pub mod oracle;
pub mod sheets;

pub use oracle::{parse_verdict, EmailOracleClient};
pub use sheets::{
    AccessToken, Clock, GoogleSheetsClient, ServiceAccountKey, ServiceAccountTokenSource,
    StaticTokenSource, SystemClock, TokenCache, TokenSource,
};
