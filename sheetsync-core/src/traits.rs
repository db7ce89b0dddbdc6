//! Collaborator traits for the pipeline.
//!
//! The pipeline talks to exactly two external systems: the tabular backend
//! holding the sheets, and the verification oracle. Both are expressed as
//! async traits so the HTTP clients and the in-memory test doubles are
//! interchangeable.

use crate::error::BackendError;
use crate::plan::Verdict;
use crate::table::{Row, TableInfo};
use async_trait::async_trait;

/// Typed operations against an index-addressed tabular store.
///
/// Row indices passed to [`TableBackend::delete_rows`] are 0-based data
/// indices: the header is not counted.
#[async_trait]
pub trait TableBackend: Send + Sync {
    /// Metadata for every table in the store.
    async fn list_tables(&self) -> Result<Vec<TableInfo>, BackendError>;

    /// Look up a table's identifier and grid size by name.
    async fn resolve_table(&self, name: &str) -> Result<TableInfo, BackendError> {
        self.list_tables()
            .await?
            .into_iter()
            .find(|t| t.name == name)
            .ok_or_else(|| BackendError::NotFound {
                table: name.to_string(),
            })
    }

    /// Read the full grid of a table, header first. An empty table yields an
    /// empty vector.
    async fn read_rows(&self, name: &str) -> Result<Vec<Row>, BackendError>;

    /// Append rows at the end of a table, preserving their order.
    ///
    /// Not idempotent: a transient failure after partial application may
    /// leave duplicates behind.
    async fn append_rows(&self, name: &str, rows: &[Row]) -> Result<(), BackendError>;

    /// Delete the given data rows in one atomic call.
    ///
    /// Every index refers to the table as it was immediately before the
    /// call, whatever order the caller passes them in.
    async fn delete_rows(&self, name: &str, indices: &[usize]) -> Result<(), BackendError>;
}

/// Single-address existence check.
///
/// Implementations never fail: anything that prevents a definite answer is
/// reported as [`Verdict::Indeterminate`].
#[async_trait]
pub trait VerificationOracle: Send + Sync {
    async fn verify(&self, address: &str) -> Verdict;
}
