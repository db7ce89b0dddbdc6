//! Background Jobs for SHEETSYNC
//!
//! - `sync`: periodically verifies and relocates rows of every source table
//!
//! # Usage
//!
//! ```ignore
//! use sheetsync_pipeline::jobs::sync_task;
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let handle = tokio::spawn(sync_task(backend, oracle, config, shutdown_rx));
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! let metrics = handle.await?;
//! ```

pub mod sync;

pub use sync::{sync_task, SyncJob, SyncMetrics, SyncMetricsSnapshot, TickSummary};
