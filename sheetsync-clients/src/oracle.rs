//! Email existence oracle client
//!
//! The oracle answers `GET <base>?email=<address>` with a JSON body carrying
//! a boolean `account_exists`. Every other outcome (non-2xx, unreadable
//! body, wrong shape, transport failure, timeout) is reported as
//! `Verdict::Indeterminate` so the pipeline keeps running and the row is
//! retried on the next tick.

use crate::sheets::client::build_http_client;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use sheetsync_core::{ConfigError, SyncConfig, Verdict, VerificationOracle};
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct OracleResponse {
    account_exists: bool,
}

/// HTTP client for the verification oracle.
#[derive(Clone)]
pub struct EmailOracleClient {
    client: reqwest::Client,
    base_url: String,
}

impl EmailOracleClient {
    /// Create a client with a per-call timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ConfigError> {
        Ok(Self {
            client: build_http_client(timeout)?,
            base_url: base_url.into(),
        })
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self, ConfigError> {
        Self::new(config.oracle_url.clone(), config.oracle_timeout)
    }
}

/// Interpret an oracle answer.
pub fn parse_verdict(status: StatusCode, body: &str) -> Verdict {
    if !status.is_success() {
        return Verdict::Indeterminate;
    }
    match serde_json::from_str::<OracleResponse>(body) {
        Ok(OracleResponse { account_exists: true }) => Verdict::Exists,
        Ok(OracleResponse {
            account_exists: false,
        }) => Verdict::NotExists,
        Err(_) => Verdict::Indeterminate,
    }
}

#[async_trait]
impl VerificationOracle for EmailOracleClient {
    async fn verify(&self, address: &str) -> Verdict {
        let response = match self
            .client
            .get(&self.base_url)
            .query(&[("email", address)])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    timeout = e.is_timeout(),
                    "Oracle request failed"
                );
                return Verdict::Indeterminate;
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(error = %e, %status, "Failed to read oracle response");
                return Verdict::Indeterminate;
            }
        };

        let verdict = parse_verdict(status, &body);
        if verdict == Verdict::Indeterminate {
            tracing::warn!(%status, body = %truncate(&body, 200), "Oracle gave no usable answer");
        } else {
            tracing::trace!(%status, ?verdict, "Oracle answered");
        }
        verdict
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

impl std::fmt::Debug for EmailOracleClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailOracleClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}
