//! Sheets v4 REST client implementing [`TableBackend`].

use super::auth::{
    Clock, ServiceAccountKey, ServiceAccountTokenSource, SystemClock, TokenCache, TokenSource,
};
use super::types::{
    a1_range, delete_requests, AppendBody, BatchUpdateBody, SpreadsheetMetadata, ValueRange,
};
use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sheetsync_core::constants::{DEFAULT_BACKEND_TIMEOUT_SECS, DEFAULT_READ_RANGE};
use sheetsync_core::{
    BackendError, ConfigError, DeletePlan, Row, SyncConfig, TableBackend, TableInfo,
};
use std::sync::Arc;
use std::time::Duration;

/// Client for one spreadsheet.
pub struct GoogleSheetsClient {
    http: reqwest::Client,
    base_url: String,
    spreadsheet_id: String,
    read_range: String,
    tokens: TokenCache,
}

impl GoogleSheetsClient {
    /// Create a client using an existing HTTP client and token cache.
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        spreadsheet_id: impl Into<String>,
        tokens: TokenCache,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            spreadsheet_id: spreadsheet_id.into(),
            read_range: DEFAULT_READ_RANGE.to_string(),
            tokens,
        }
    }

    /// Set the column range read from each table.
    pub fn with_read_range(mut self, range: impl Into<String>) -> Self {
        self.read_range = range.into();
        self
    }

    /// Build a client from pipeline configuration, loading the service
    /// account key from disk.
    pub fn from_config(config: &SyncConfig) -> Result<Self, ConfigError> {
        let key = ServiceAccountKey::from_file(&config.credentials_file)?;
        let http = build_http_client(Duration::from_secs(DEFAULT_BACKEND_TIMEOUT_SECS))?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let source: Arc<dyn TokenSource> = Arc::new(ServiceAccountTokenSource::new(
            http.clone(),
            key,
            Arc::clone(&clock),
        )?);

        Ok(Self::new(
            http,
            config.sheets_api_base.clone(),
            config.spreadsheet_id.clone(),
            TokenCache::new(source, clock),
        )
        .with_read_range(config.read_range.clone()))
    }

    fn url(&self, operation: &str, segments: &[&str]) -> Result<Url, BackendError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| BackendError::protocol(operation, format!("invalid base URL: {}", e)))?;
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| BackendError::protocol(operation, "base URL cannot carry a path"))?;
            path.pop_if_empty()
                .extend(["v4", "spreadsheets"])
                .extend(segments);
        }
        Ok(url)
    }

    /// Send an authenticated request and decode the JSON answer.
    async fn execute<B, T>(
        &self,
        operation: &str,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<T, BackendError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let token = self.tokens.bearer().await?;

        let mut request = self.http.request(method, url).bearer_auth(token.expose());
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| BackendError::unavailable(operation, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
                self.tokens.invalidate().await;
            }
            return Err(status_error(operation, status, &text));
        }

        response.json().await.map_err(|e| {
            BackendError::protocol(operation, format!("failed to parse response: {}", e))
        })
    }
}

/// Map a non-success status to the backend error taxonomy.
///
/// Throttling, server errors and rejected credentials are transient; any
/// other client error means we sent something the backend does not accept.
pub fn status_error(operation: &str, status: StatusCode, body: &str) -> BackendError {
    let reason = format!("{}: {}", status, body.trim());
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        BackendError::unavailable(operation, reason)
    } else {
        BackendError::protocol(operation, reason)
    }
}

pub(crate) fn build_http_client(timeout: Duration) -> Result<reqwest::Client, ConfigError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ConfigError::InvalidValue {
            field: "http_client".to_string(),
            value: format!("{:?}", timeout),
            reason: format!("Failed to create HTTP client: {}", e),
        })
}

#[async_trait]
impl TableBackend for GoogleSheetsClient {
    async fn list_tables(&self) -> Result<Vec<TableInfo>, BackendError> {
        let operation = "list_tables";
        let mut url = self.url(operation, &[&self.spreadsheet_id])?;
        url.query_pairs_mut().append_pair("fields", "sheets.properties");

        let meta: SpreadsheetMetadata = self
            .execute::<(), _>(operation, Method::GET, url, None)
            .await?;

        Ok(meta
            .sheets
            .into_iter()
            .map(|entry| entry.properties.into())
            .collect())
    }

    async fn read_rows(&self, name: &str) -> Result<Vec<Row>, BackendError> {
        let operation = "read_rows";
        let range = a1_range(name, &self.read_range);
        let url = self.url(operation, &[&self.spreadsheet_id, "values", &range])?;

        let values: ValueRange = self
            .execute::<(), _>(operation, Method::GET, url, None)
            .await
            .map_err(|e| match e {
                // An unknown sheet in a range read comes back as a 400.
                BackendError::Protocol { ref reason, .. }
                    if reason.contains("Unable to parse range") =>
                {
                    BackendError::NotFound {
                        table: name.to_string(),
                    }
                }
                other => other,
            })?;

        let rows = values.into_rows();
        tracing::debug!(table = name, rows = rows.len(), "Read table");
        Ok(rows)
    }

    async fn append_rows(&self, name: &str, rows: &[Row]) -> Result<(), BackendError> {
        if rows.is_empty() {
            return Ok(());
        }

        let operation = "append_rows";
        let target = format!("{}:append", a1_range(name, "A1"));
        let mut url = self.url(operation, &[&self.spreadsheet_id, "values", &target])?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");

        let _: serde_json::Value = self
            .execute(operation, Method::POST, url, Some(&AppendBody { values: rows }))
            .await?;

        tracing::debug!(table = name, rows = rows.len(), "Appended rows");
        Ok(())
    }

    async fn delete_rows(&self, name: &str, indices: &[usize]) -> Result<(), BackendError> {
        if indices.is_empty() {
            return Ok(());
        }

        let operation = "delete_rows";
        let info = self.resolve_table(name).await?;
        let plan = DeletePlan::new(info.row_count, indices.iter().copied());

        if plan.pad {
            tracing::info!(
                table = name,
                total_rows = info.row_count,
                deleting = plan.indices.len(),
                "Padding table with an empty row before deleting every data row"
            );
        }

        let body = BatchUpdateBody {
            requests: delete_requests(info.id, &plan),
        };
        let target = format!("{}:batchUpdate", self.spreadsheet_id);
        let url = self.url(operation, &[&target])?;

        let _: serde_json::Value = self
            .execute(operation, Method::POST, url, Some(&body))
            .await?;

        tracing::debug!(table = name, rows = plan.indices.len(), "Deleted rows");
        Ok(())
    }
}

impl std::fmt::Debug for GoogleSheetsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleSheetsClient")
            .field("base_url", &self.base_url)
            .field("spreadsheet_id", &self.spreadsheet_id)
            .field("read_range", &self.read_range)
            .finish()
    }
}
