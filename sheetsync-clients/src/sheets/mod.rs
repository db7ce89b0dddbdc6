//! Google Sheets backend
//!
//! This module provides the Sheets v4 implementation of `TableBackend` along
//! with the service account token lifecycle it depends on.

pub mod auth;
pub mod client;
pub mod types;

pub use auth::{
    AccessToken, AssertionClaims, Clock, FixedClock, ServiceAccountKey,
    ServiceAccountTokenSource, StaticTokenSource, SystemClock, TokenCache, TokenSource,
};
pub use client::{status_error, GoogleSheetsClient};
