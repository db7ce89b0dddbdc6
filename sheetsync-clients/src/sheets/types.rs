//! Sheets v4 request and response types

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sheetsync_core::{DeletePlan, Row, TableInfo};

// ============================================================================
// METADATA TYPES
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct SpreadsheetMetadata {
    #[serde(default)]
    pub sheets: Vec<SheetEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SheetEntry {
    pub properties: SheetProperties,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetProperties {
    pub sheet_id: i64,
    pub title: String,
    #[serde(default)]
    pub grid_properties: GridProperties,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridProperties {
    #[serde(default)]
    pub row_count: usize,
    #[serde(default)]
    pub column_count: usize,
}

impl From<SheetProperties> for TableInfo {
    fn from(props: SheetProperties) -> Self {
        TableInfo {
            name: props.title,
            id: props.sheet_id,
            row_count: props.grid_properties.row_count,
            column_count: props.grid_properties.column_count,
        }
    }
}

// ============================================================================
// VALUE TYPES
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ValueRange {
    #[serde(default)]
    pub values: Vec<Vec<Value>>,
}

impl ValueRange {
    /// Flatten the grid into string cells. Formatted reads return strings;
    /// anything else is rendered as JSON text.
    pub fn into_rows(self) -> Vec<Row> {
        self.values
            .into_iter()
            .map(|row| row.into_iter().map(cell_text).collect())
            .collect()
    }
}

fn cell_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AppendBody<'a> {
    pub values: &'a [Row],
}

// ============================================================================
// BATCH UPDATE
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct BatchUpdateBody {
    pub requests: Vec<Value>,
}

/// Structural requests for a planned delete.
///
/// Data index `d` addresses grid row `d + 1` because the header occupies
/// grid row 0. The padding row, when needed, is appended first so it never
/// shifts a row that is about to be deleted.
pub fn delete_requests(sheet_id: i64, plan: &DeletePlan) -> Vec<Value> {
    let mut requests = Vec::with_capacity(plan.indices.len() + 1);

    if plan.pad {
        requests.push(json!({
            "appendDimension": {
                "sheetId": sheet_id,
                "dimension": "ROWS",
                "length": 1
            }
        }));
    }

    for &index in &plan.indices {
        let start = index + 1;
        requests.push(json!({
            "deleteDimension": {
                "range": {
                    "sheetId": sheet_id,
                    "dimension": "ROWS",
                    "startIndex": start,
                    "endIndex": start + 1
                }
            }
        }));
    }

    requests
}

/// A1 range for a whole-column read of `table`, quoting names that need it.
pub fn a1_range(table: &str, columns: &str) -> String {
    let plain = !table.is_empty()
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if plain {
        format!("{}!{}", table, columns)
    } else {
        format!("'{}'!{}", table.replace('\'', "''"), columns)
    }
}

// ============================================================================
// TESTS
// ============================================================================
