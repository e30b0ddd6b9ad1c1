//! batchwork - resumable batch record processing.
//!
//! ## Architecture
//!
//! A run is three cooperating stages joined by bounded queues:
//! - **Reader**: parses the input file and drops records already checkpointed
//! - **Worker Pool**: runs the caller's task on each record, optionally throttled
//! - **Checkpoint Writer**: appends the key of every finished record to disk
//!
//! Keys written by earlier runs are loaded into memory before any input is
//! filtered, so re-running a batch only processes what is left.
//!
//! ## Guarantees
//!
//! - A record is re-attempted only if its key never reached the checkpoint file
//! - Records finish in no particular order relative to the input
//! - Any fatal error stops every stage and surfaces from `BatchPipeline::run`

pub mod checkpoint;
pub mod demo;
pub mod job;
pub mod models;
pub mod pipeline;
pub mod pool;
pub mod report;

// Re-exports for convenience
pub use checkpoint::{CheckpointWriter, KeySet};
pub use job::BatchJob;
pub use models::{BatchConfig, BatchError, ConfigError, Result, RunStats};
pub use pipeline::{BatchPipeline, UnprocessedReader};
pub use pool::{WorkerPool, WorkerReport};
pub use report::{LogReporter, ProgressReporter, SpinnerReporter};
