//! Verification outcomes and the relocation/deletion plans derived from them.
//!
//! Deletion indices always identify a physical position, not a row identity.
//! Every plan in this module therefore orders indices descending: removing a
//! higher index first never shifts a lower index that is still pending.

use crate::table::Row;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ============================================================================
// VERDICTS
// ============================================================================

/// Tri-state answer from the verification oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// The address exists; the row is moved then deleted
    Exists,
    /// The address does not exist; the row is deleted
    NotExists,
    /// Transport or parse failure; the row is left for the next tick
    Indeterminate,
}

/// One row's verification result, tagged with its original data index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationOutcome {
    /// 0-based data index in the table as read (header excluded)
    pub index: usize,
    pub row: Row,
    pub verdict: Verdict,
}

/// Where a row ends up after a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowDisposition {
    MovedAndDeleted,
    DeletedOnly,
    Untouched,
}

impl Verdict {
    pub fn disposition(&self) -> RowDisposition {
        match self {
            Verdict::Exists => RowDisposition::MovedAndDeleted,
            Verdict::NotExists => RowDisposition::DeletedOnly,
            Verdict::Indeterminate => RowDisposition::Untouched,
        }
    }
}

// ============================================================================
// RELOCATION PLAN
// ============================================================================

/// Move/delete decision set for one run over one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelocationPlan {
    /// Full rows to append to the destination, in source order
    pub moves: Vec<Row>,
    /// Source data indices to delete, strictly descending
    pub deletions: Vec<usize>,
    /// Rows left in place because the oracle could not decide
    pub indeterminate: usize,
}

impl RelocationPlan {
    /// Build a plan from a run's outcomes. Outcomes may arrive in any order.
    pub fn from_outcomes(outcomes: &[VerificationOutcome]) -> Self {
        let mut ordered: Vec<&VerificationOutcome> = outcomes.iter().collect();
        ordered.sort_by_key(|o| o.index);

        let mut moves = Vec::new();
        let mut deletions = BTreeSet::new();
        let mut indeterminate = 0;

        for outcome in ordered {
            match outcome.verdict.disposition() {
                RowDisposition::MovedAndDeleted => {
                    moves.push(outcome.row.clone());
                    deletions.insert(outcome.index);
                }
                RowDisposition::DeletedOnly => {
                    deletions.insert(outcome.index);
                }
                RowDisposition::Untouched => indeterminate += 1,
            }
        }

        Self {
            moves,
            deletions: deletions.into_iter().rev().collect(),
            indeterminate,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty() && self.deletions.is_empty()
    }
}

// ============================================================================
// DELETE PLAN
// ============================================================================

/// Backend-level plan for one batch delete call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletePlan {
    /// Append one empty row before deleting
    pub pad: bool,
    /// Data indices, strictly descending, de-duplicated
    pub indices: Vec<usize>,
}

impl DeletePlan {
    /// Plan a delete of `indices` against a grid with `total_rows` rows
    /// (header included).
    ///
    /// When the delete would leave no data row slot the grid gets one empty
    /// row appended at its end first; the backend refuses to remove every
    /// non-frozen row of a sheet.
    pub fn new(total_rows: usize, indices: impl IntoIterator<Item = usize>) -> Self {
        let unique: BTreeSet<usize> = indices.into_iter().collect();
        let indices: Vec<usize> = unique.into_iter().rev().collect();
        let pad = !indices.is_empty() && indices.len() >= total_rows.saturating_sub(1);
        Self { pad, indices }
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Apply descending single-index removals to an in-memory list of data rows.
///
/// Indices past the end are ignored, matching a backend that rejects nothing
/// but has nothing to remove.
pub fn apply_descending<T>(rows: &mut Vec<T>, descending: &[usize]) {
    for &index in descending {
        if index < rows.len() {
            rows.remove(index);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
