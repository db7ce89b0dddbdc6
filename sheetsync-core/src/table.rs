//! Table, row and header types plus column addressing.
//!
//! A table as returned by the backend is a grid of strings. Row 0 is the
//! header; everything after it is a data row addressed by a 0-based data
//! index (header excluded). Rows may be ragged: trailing empty cells are
//! not transmitted by the backend.

use serde::{Deserialize, Serialize};

/// A single cell value.
pub type Cell = String;

/// An ordered sequence of cells.
pub type Row = Vec<Cell>;

/// Largest column index reachable with the letter scheme (`ZZZ`).
pub const MAX_COLUMN_INDEX: usize = 18_277;

// ============================================================================
// TABLE METADATA
// ============================================================================

/// Structural metadata for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    /// Table name (sheet title)
    pub name: String,
    /// Backend-assigned numeric identifier, only used for structural edits
    pub id: i64,
    /// Grid row count, header included
    pub row_count: usize,
    /// Grid column count
    pub column_count: usize,
}

// ============================================================================
// HEADER
// ============================================================================

/// The first row of a table, mapping column names to positions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Header {
    columns: Vec<String>,
}

impl Header {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    /// Position of the first column whose header equals `name` exactly.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Split a fetched grid into its header and data rows.
///
/// Returns `None` when the grid is completely empty.
pub fn split_header(mut grid: Vec<Row>) -> Option<(Header, Vec<Row>)> {
    if grid.is_empty() {
        return None;
    }
    let data = grid.split_off(1);
    let header = grid.pop().map(Header::new).unwrap_or_default();
    Some((header, data))
}

/// Cell at `index`, treating cells past the end of a ragged row as empty.
pub fn cell(row: &[Cell], index: usize) -> &str {
    row.get(index).map(String::as_str).unwrap_or("")
}

// ============================================================================
// COLUMN LETTERS
// ============================================================================

/// Translate a spreadsheet column letter (`A`, `Z`, `AA`, ...) to a 0-based
/// column index. Case-insensitive. Returns `None` for empty input, anything
/// other than ASCII letters, or columns past [`MAX_COLUMN_INDEX`].
pub fn column_letter_to_index(letters: &str) -> Option<usize> {
    if letters.is_empty() || letters.len() > 3 {
        return None;
    }

    let mut value = 0usize;
    for ch in letters.chars() {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        let digit = (ch.to_ascii_uppercase() as u8 - b'A') as usize + 1;
        value = value * 26 + digit;
    }

    let index = value - 1;
    (index <= MAX_COLUMN_INDEX).then_some(index)
}

/// Inverse of [`column_letter_to_index`].
pub fn column_index_to_letter(index: usize) -> Option<String> {
    if index > MAX_COLUMN_INDEX {
        return None;
    }

    let mut n = index + 1;
    let mut letters = Vec::with_capacity(3);
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    Some(letters.into_iter().rev().collect())
}

/// Number of columns covered by an A1 column range such as `A:Z` or
/// `B2:F100`. Returns `None` when either end has no column letters.
pub fn range_width(range: &str) -> Option<usize> {
    let (start, end) = range.split_once(':').unwrap_or((range, range));
    let column = |bound: &str| {
        let letters = bound.trim().trim_end_matches(|c: char| c.is_ascii_digit());
        column_letter_to_index(letters)
    };
    let (start, end) = (column(start)?, column(end)?);
    (end >= start).then(|| end - start + 1)
}

// ============================================================================
// SEARCH HELPERS
// ============================================================================

/// Rows whose cell in `search_column` (a column letter) equals `value`.
///
/// Returns an empty vector when the column letter is invalid.
pub fn rows_matching<'a>(rows: &'a [Row], search_column: &str, value: &str) -> Vec<&'a Row> {
    let Some(index) = column_letter_to_index(search_column) else {
        return Vec::new();
    };
    rows.iter()
        .filter(|row| row.get(index).is_some_and(|c| c == value))
        .collect()
}

/// Value of `cell_column` in the first row whose `search_column` equals
/// `value`.
pub fn cell_by_search<'a>(
    rows: &'a [Row],
    search_column: &str,
    value: &str,
    cell_column: &str,
) -> Option<&'a str> {
    let cell_index = column_letter_to_index(cell_column)?;
    rows_matching(rows, search_column, value)
        .first()
        .and_then(|row| row.get(cell_index))
        .map(String::as_str)
}

// ============================================================================
// TESTS
// ============================================================================
