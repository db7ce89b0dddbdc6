//! Applying a relocation plan to the backend.
//!
//! Ordering is the whole contract here: moved rows are appended to the
//! destination before anything is deleted from the source, and a failed
//! append means no deletion at all for the run. A row is therefore never
//! lost; at worst it is duplicated in the destination.

use sheetsync_core::{BackendError, RelocationPlan, TableBackend};
use std::sync::Arc;

/// What a relocation actually did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelocationReport {
    pub moved: usize,
    pub deleted: usize,
}

/// Which relocation step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocationStep {
    Append,
    Delete,
}

impl RelocationStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelocationStep::Append => "append",
            RelocationStep::Delete => "delete",
        }
    }
}

/// A failed relocation. `moved` is non-zero when the append went through
/// but the delete did not; those rows now exist in both tables.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Relocation failed at {}: {source}", .step.as_str())]
pub struct RelocationError {
    pub step: RelocationStep,
    pub moved: usize,
    pub source: BackendError,
}

/// Moves verified rows into the destination and deletes resolved rows from
/// their source table.
#[derive(Clone)]
pub struct RowRelocator {
    backend: Arc<dyn TableBackend>,
    destination: String,
}

impl RowRelocator {
    pub fn new(backend: Arc<dyn TableBackend>, destination: impl Into<String>) -> Self {
        Self {
            backend,
            destination: destination.into(),
        }
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Apply `plan` to the table named `source`.
    pub async fn apply(
        &self,
        source: &str,
        plan: &RelocationPlan,
    ) -> Result<RelocationReport, RelocationError> {
        let mut report = RelocationReport::default();

        if !plan.moves.is_empty() {
            self.backend
                .append_rows(&self.destination, &plan.moves)
                .await
                .map_err(|source| RelocationError {
                    step: RelocationStep::Append,
                    moved: 0,
                    source,
                })?;
            report.moved = plan.moves.len();
            tracing::info!(
                table = source,
                destination = %self.destination,
                rows = report.moved,
                "Moved verified rows"
            );
        }

        if !plan.deletions.is_empty() {
            self.backend
                .delete_rows(source, &plan.deletions)
                .await
                .map_err(|e| RelocationError {
                    step: RelocationStep::Delete,
                    moved: report.moved,
                    source: e,
                })?;
            report.deleted = plan.deletions.len();
            tracing::info!(table = source, rows = report.deleted, "Deleted resolved rows");
        }

        Ok(report)
    }
}

impl std::fmt::Debug for RowRelocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowRelocator")
            .field("destination", &self.destination)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheetsync_core::{RelocationPlan, Verdict, VerificationOutcome};
    use sheetsync_test_utils::{gmail_scenario, grid, BackendCall, MemoryBackend, Operation};

    fn gmail_plan() -> RelocationPlan {
        RelocationPlan::from_outcomes(&[
            VerificationOutcome {
                index: 0,
                row: vec!["A".to_string(), "a@x.com".to_string()],
                verdict: Verdict::Exists,
            },
            VerificationOutcome {
                index: 2,
                row: vec!["C".to_string(), "b@x.com".to_string()],
                verdict: Verdict::NotExists,
            },
        ])
    }

    #[tokio::test]
    async fn test_append_then_delete() {
        let (backend, _) = gmail_scenario();
        let backend = Arc::new(backend);
        let relocator = RowRelocator::new(backend.clone(), "VERIFIED");

        let report = relocator.apply("GMAIL", &gmail_plan()).await.unwrap();

        assert_eq!(report, RelocationReport { moved: 1, deleted: 2 });
        let mutations: Vec<BackendCall> = backend
            .calls()
            .into_iter()
            .filter(|c| !matches!(c, BackendCall::ListTables))
            .collect();
        assert!(matches!(mutations[0], BackendCall::AppendRows { .. }));
        assert!(matches!(mutations[1], BackendCall::DeleteRows { .. }));
        assert_eq!(backend.delete_calls("GMAIL"), vec![(vec![2, 0], false)]);
        assert_eq!(backend.data_rows("GMAIL"), grid(&[&["B", ""]]));
        assert_eq!(backend.data_rows("VERIFIED"), grid(&[&["A", "a@x.com"]]));
    }

    #[tokio::test]
    async fn test_failed_append_deletes_nothing() {
        let (backend, _) = gmail_scenario();
        backend.fail_on(
            Operation::AppendRows,
            Some("VERIFIED"),
            BackendError::unavailable("append_rows", "503 Service Unavailable"),
        );
        let backend = Arc::new(backend);
        let relocator = RowRelocator::new(backend.clone(), "VERIFIED");

        let err = relocator.apply("GMAIL", &gmail_plan()).await.unwrap_err();

        assert_eq!(err.step, RelocationStep::Append);
        assert_eq!(err.moved, 0);
        assert!(backend.delete_calls("GMAIL").is_empty());
        assert_eq!(backend.data_rows("GMAIL").len(), 3);
    }

    #[tokio::test]
    async fn test_failed_delete_reports_moved_rows() {
        let (backend, _) = gmail_scenario();
        backend.fail_on(
            Operation::DeleteRows,
            None,
            BackendError::protocol("delete_rows", "400 Bad Request"),
        );
        let backend = Arc::new(backend);
        let relocator = RowRelocator::new(backend.clone(), "VERIFIED");

        let err = relocator.apply("GMAIL", &gmail_plan()).await.unwrap_err();

        assert_eq!(err.step, RelocationStep::Delete);
        assert_eq!(err.moved, 1);
        assert_eq!(backend.data_rows("VERIFIED").len(), 1);
    }

    #[tokio::test]
    async fn test_delete_only_plan_skips_append() {
        let backend = Arc::new(
            MemoryBackend::new()
                .with_table("AOL", grid(&[&["email"], &["x@x.com"], &["y@x.com"]]))
                .with_table("VERIFIED", grid(&[&["email"]])),
        );
        let relocator = RowRelocator::new(backend.clone(), "VERIFIED");
        let plan = RelocationPlan {
            moves: Vec::new(),
            deletions: vec![1],
            indeterminate: 1,
        };

        let report = relocator.apply("AOL", &plan).await.unwrap();

        assert_eq!(report, RelocationReport { moved: 0, deleted: 1 });
        assert!(backend.append_calls("VERIFIED").is_empty());
        assert_eq!(backend.data_rows("AOL"), grid(&[&["x@x.com"]]));
    }

    #[tokio::test]
    async fn test_empty_plan_touches_nothing() {
        let backend = Arc::new(MemoryBackend::new());
        let relocator = RowRelocator::new(backend.clone(), "VERIFIED");

        let report = relocator
            .apply("GMAIL", &RelocationPlan::default())
            .await
            .unwrap();

        assert_eq!(report, RelocationReport::default());
        assert!(backend.calls().is_empty());
    }
}
