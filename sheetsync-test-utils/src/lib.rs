//! SHEETSYNC Test Utilities
//!
//! Centralized test infrastructure for the SHEETSYNC workspace:
//! - [`MemoryBackend`]: in-memory `TableBackend` with call recording and
//!   failure injection
//! - [`ScriptedOracle`]: `VerificationOracle` answering from a script
//! - Fixtures for the common pipeline scenarios
//! - Proptest generators for tables and verdicts

pub use sheetsync_core::{
    BackendError, DeletePlan, Row, TableBackend, TableInfo, Verdict, VerificationOracle,
};

use async_trait::async_trait;
use proptest::prelude::*;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// MEMORY BACKEND
// ============================================================================

/// Backend operation, used to target injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListTables,
    ReadRows,
    AppendRows,
    DeleteRows,
}

/// A call received by [`MemoryBackend`], recorded before it is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    ListTables,
    ReadRows {
        table: String,
    },
    AppendRows {
        table: String,
        rows: Vec<Row>,
    },
    DeleteRows {
        table: String,
        /// Indices exactly as the caller passed them
        indices: Vec<usize>,
        padded: bool,
    },
}

#[derive(Debug, Clone)]
struct MemoryTable {
    id: i64,
    /// Full grid, header first. May carry trailing blank rows.
    grid: Vec<Row>,
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: BTreeMap<String, MemoryTable>,
    next_id: i64,
    calls: Vec<BackendCall>,
    failures: HashMap<(Operation, Option<String>), BackendError>,
}

impl MemoryState {
    fn injected(&self, op: Operation, table: Option<&str>) -> Option<BackendError> {
        if let Some(table) = table {
            if let Some(err) = self.failures.get(&(op, Some(table.to_string()))) {
                return Some(err.clone());
            }
        }
        self.failures.get(&(op, None)).cloned()
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut MemoryTable, BackendError> {
        self.tables.get_mut(name).ok_or_else(|| BackendError::NotFound {
            table: name.to_string(),
        })
    }
}

fn is_blank(row: &Row) -> bool {
    row.iter().all(|c| c.is_empty())
}

/// In-memory tabular store that behaves like the Sheets backend where the
/// pipeline can observe it:
///
/// - reads omit trailing blank rows
/// - a delete that would leave no row below the header is rejected
/// - delete indices address the grid as it was before the call
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`MemoryBackend::insert_table`].
    pub fn with_table(self, name: impl Into<String>, grid: Vec<Row>) -> Self {
        self.insert_table(name, grid);
        self
    }

    /// Create or replace a table. `grid` includes the header row.
    pub fn insert_table(&self, name: impl Into<String>, grid: Vec<Row>) {
        let mut state = lock(&self.state);
        state.next_id += 1;
        let id = state.next_id;
        state.tables.insert(name.into(), MemoryTable { id, grid });
    }

    /// Raw grid of a table, header and trailing blank rows included.
    pub fn grid(&self, name: &str) -> Option<Vec<Row>> {
        lock(&self.state).tables.get(name).map(|t| t.grid.clone())
    }

    /// Non-blank data rows of a table.
    pub fn data_rows(&self, name: &str) -> Vec<Row> {
        self.grid(name)
            .map(|grid| grid.into_iter().skip(1).filter(|r| !is_blank(r)).collect())
            .unwrap_or_default()
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<BackendCall> {
        lock(&self.state).calls.clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.state).calls.clear();
    }

    /// Delete calls received for `table`.
    pub fn delete_calls(&self, table: &str) -> Vec<(Vec<usize>, bool)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::DeleteRows {
                    table: t,
                    indices,
                    padded,
                } if t == table => Some((indices, padded)),
                _ => None,
            })
            .collect()
    }

    /// Append calls received for `table`.
    pub fn append_calls(&self, table: &str) -> Vec<Vec<Row>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::AppendRows { table: t, rows } if t == table => Some(rows),
                _ => None,
            })
            .collect()
    }

    /// Make `op` fail with `error`, for one table or for all of them.
    ///
    /// The failure persists until [`MemoryBackend::clear_failures`].
    pub fn fail_on(&self, op: Operation, table: Option<&str>, error: BackendError) {
        lock(&self.state)
            .failures
            .insert((op, table.map(str::to_string)), error);
    }

    pub fn clear_failures(&self) {
        lock(&self.state).failures.clear();
    }
}

#[async_trait]
impl TableBackend for MemoryBackend {
    async fn list_tables(&self) -> Result<Vec<TableInfo>, BackendError> {
        let mut state = lock(&self.state);
        state.calls.push(BackendCall::ListTables);
        if let Some(err) = state.injected(Operation::ListTables, None) {
            return Err(err);
        }

        Ok(state
            .tables
            .iter()
            .map(|(name, table)| TableInfo {
                name: name.clone(),
                id: table.id,
                row_count: table.grid.len(),
                column_count: table.grid.iter().map(Vec::len).max().unwrap_or(0),
            })
            .collect())
    }

    async fn read_rows(&self, name: &str) -> Result<Vec<Row>, BackendError> {
        let mut state = lock(&self.state);
        state.calls.push(BackendCall::ReadRows {
            table: name.to_string(),
        });
        if let Some(err) = state.injected(Operation::ReadRows, Some(name)) {
            return Err(err);
        }

        let mut rows = state.table_mut(name)?.grid.clone();
        while rows.last().is_some_and(is_blank) {
            rows.pop();
        }
        Ok(rows)
    }

    async fn append_rows(&self, name: &str, rows: &[Row]) -> Result<(), BackendError> {
        let mut state = lock(&self.state);
        state.calls.push(BackendCall::AppendRows {
            table: name.to_string(),
            rows: rows.to_vec(),
        });
        if let Some(err) = state.injected(Operation::AppendRows, Some(name)) {
            return Err(err);
        }

        let table = state.table_mut(name)?;
        // Appends land after the last non-blank row, like the Sheets append.
        while table.grid.len() > 1 && table.grid.last().is_some_and(is_blank) {
            table.grid.pop();
        }
        table.grid.extend(rows.iter().cloned());
        Ok(())
    }

    async fn delete_rows(&self, name: &str, indices: &[usize]) -> Result<(), BackendError> {
        let mut state = lock(&self.state);
        let total_rows = state.tables.get(name).map(|t| t.grid.len()).unwrap_or(0);
        let plan = DeletePlan::new(total_rows, indices.iter().copied());
        state.calls.push(BackendCall::DeleteRows {
            table: name.to_string(),
            indices: indices.to_vec(),
            padded: plan.pad,
        });
        if let Some(err) = state.injected(Operation::DeleteRows, Some(name)) {
            return Err(err);
        }
        if plan.is_empty() {
            return Ok(());
        }

        let table = state.table_mut(name)?;
        let mut grid = table.grid.clone();
        if plan.pad {
            grid.push(Row::new());
        }

        for &index in &plan.indices {
            let grid_row = index + 1;
            if grid_row >= grid.len() {
                return Err(BackendError::protocol(
                    "delete_rows",
                    format!("row index {} out of range for {}", index, name),
                ));
            }
            grid.remove(grid_row);
        }

        if grid.len() < 2 {
            return Err(BackendError::protocol(
                "delete_rows",
                "You can't delete all the rows on the sheet.",
            ));
        }

        table.grid = grid;
        Ok(())
    }
}

// ============================================================================
// SCRIPTED ORACLE
// ============================================================================

/// Oracle that answers from a per-address script.
///
/// Unknown addresses get the default verdict. Per-address delays make it
/// possible to exercise timeouts and batch concurrency.
#[derive(Debug)]
pub struct ScriptedOracle {
    verdicts: HashMap<String, Verdict>,
    delays: HashMap<String, Duration>,
    default: Verdict,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for ScriptedOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedOracle {
    /// Create an oracle that answers `Indeterminate` to everything.
    pub fn new() -> Self {
        Self {
            verdicts: HashMap::new(),
            delays: HashMap::new(),
            default: Verdict::Indeterminate,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_verdict(mut self, address: impl Into<String>, verdict: Verdict) -> Self {
        self.verdicts.insert(address.into(), verdict);
        self
    }

    pub fn with_delay(mut self, address: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(address.into(), delay);
        self
    }

    pub fn with_default(mut self, verdict: Verdict) -> Self {
        self.default = verdict;
        self
    }

    /// Addresses queried so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Distinct addresses queried so far.
    pub fn distinct_calls(&self) -> HashSet<String> {
        self.calls().into_iter().collect()
    }

    /// Highest number of calls that were in progress at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VerificationOracle for ScriptedOracle {
    async fn verify(&self, address: &str) -> Verdict {
        lock(&self.calls).push(address.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delays.get(address) {
            tokio::time::sleep(*delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.verdicts.get(address).copied().unwrap_or(self.default)
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

/// Build a grid from string literals.
pub fn grid(rows: &[&[&str]]) -> Vec<Row> {
    rows.iter()
        .map(|row| row.iter().map(|c| c.to_string()).collect())
        .collect()
}

/// The canonical mixed table: one existing address, one blank, one
/// non-existing.
///
/// ```text
/// GMAIL:    [name, email] / [A, a@x.com] / [B, ""] / [C, b@x.com]
/// VERIFIED: [name, email]
/// ```
pub fn gmail_scenario() -> (MemoryBackend, ScriptedOracle) {
    let backend = MemoryBackend::new()
        .with_table(
            "GMAIL",
            grid(&[
                &["name", "email"],
                &["A", "a@x.com"],
                &["B", ""],
                &["C", "b@x.com"],
            ]),
        )
        .with_table("VERIFIED", grid(&[&["name", "email"]]));
    let oracle = ScriptedOracle::new()
        .with_verdict("a@x.com", Verdict::Exists)
        .with_verdict("b@x.com", Verdict::NotExists);
    (backend, oracle)
}

/// A source table whose rows are all resolved, so a run empties it.
pub fn all_resolved_scenario() -> (MemoryBackend, ScriptedOracle) {
    let backend = MemoryBackend::new()
        .with_table(
            "OFFICE",
            grid(&[
                &["name", "email"],
                &["A", "a@x.com"],
                &["B", "b@x.com"],
                &["C", "c@x.com"],
            ]),
        )
        .with_table("VERIFIED", grid(&[&["name", "email"]]));
    let oracle = ScriptedOracle::new()
        .with_verdict("a@x.com", Verdict::Exists)
        .with_verdict("b@x.com", Verdict::NotExists)
        .with_verdict("c@x.com", Verdict::Exists);
    (backend, oracle)
}

// ============================================================================
// GENERATORS
// ============================================================================

/// A generated source table with a scripted verdict per address.
#[derive(Debug, Clone)]
pub struct GeneratedTable {
    /// Header first, then data rows `[id, email]`
    pub grid: Vec<Row>,
    pub oracle_script: Vec<(String, Verdict)>,
}

impl GeneratedTable {
    pub fn oracle(&self) -> ScriptedOracle {
        self.oracle_script
            .iter()
            .fold(ScriptedOracle::new(), |oracle, (address, verdict)| {
                oracle.with_verdict(address.clone(), *verdict)
            })
    }

    /// Expected verdict for every data row, `None` for a blank address.
    pub fn expected(&self) -> Vec<Option<Verdict>> {
        let script: HashMap<&str, Verdict> = self
            .oracle_script
            .iter()
            .map(|(a, v)| (a.as_str(), *v))
            .collect();
        self.grid
            .iter()
            .skip(1)
            .map(|row| script.get(row[1].as_str()).copied())
            .collect()
    }
}

pub fn arb_verdict() -> impl Strategy<Value = Verdict> {
    prop_oneof![
        Just(Verdict::Exists),
        Just(Verdict::NotExists),
        Just(Verdict::Indeterminate),
    ]
}

/// Tables of up to `max_rows` data rows with unique addresses. Roughly one
/// row in six has a blank address.
pub fn arb_table(max_rows: usize) -> impl Strategy<Value = GeneratedTable> {
    prop::collection::vec(
        (arb_verdict(), prop::bool::weighted(1.0 / 6.0)),
        0..=max_rows,
    )
    .prop_map(|rows| {
        let mut grid = vec![vec!["id".to_string(), "email".to_string()]];
        let mut oracle_script = Vec::new();
        for (i, (verdict, blank)) in rows.into_iter().enumerate() {
            let address = if blank {
                String::new()
            } else {
                format!("user{}@example.com", i)
            };
            if !blank {
                oracle_script.push((address.clone(), verdict));
            }
            grid.push(vec![format!("row{}", i), address]);
        }
        GeneratedTable {
            grid,
            oracle_script,
        }
    })
}

// ============================================================================
// TESTS
// ============================================================================
