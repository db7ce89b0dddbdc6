//! SHEETSYNC Core - Shared Types
//!
//! Data types, planning logic and collaborator traits for the sheet
//! verification pipeline. Every other crate depends on this one; it performs
//! no I/O of its own.

pub mod config;
pub mod constants;
pub mod error;
pub mod plan;
pub mod table;
pub mod traits;

pub use config::SyncConfig;
pub use error::{BackendError, ConfigError, ErrorKind, SyncError, SyncResult};
pub use plan::{
    apply_descending, DeletePlan, RelocationPlan, RowDisposition, Verdict, VerificationOutcome,
};
pub use table::{
    cell, cell_by_search, column_index_to_letter, column_letter_to_index, range_width,
    rows_matching, split_header, Cell, Header, Row, TableInfo, MAX_COLUMN_INDEX,
};
pub use traits::{TableBackend, VerificationOracle};
