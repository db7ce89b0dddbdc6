//! SHEETSYNC Pipeline - Verification and Relocation
//!
//! Drives the periodic reconciliation of source tables:
//!
//! - [`verifier`]: batched, bounded-concurrency oracle checks
//! - [`relocator`]: move-then-delete application of a plan
//! - [`run`]: one pass over one table
//! - [`jobs`]: the scheduled background task
//! - [`telemetry`]: tracing subscriber setup for the binary

pub mod jobs;
pub mod relocator;
pub mod run;
pub mod telemetry;
pub mod verifier;

pub use jobs::{sync_task, SyncJob, SyncMetrics, SyncMetricsSnapshot, TickSummary};
pub use relocator::{RelocationError, RelocationReport, RelocationStep, RowRelocator};
pub use run::{check_tables, Stage, TableCheck, TableRunError, TableRunReport, TableRunner};
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig};
pub use verifier::BatchVerifier;
