//! Run statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Statistics for a batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStats {
    /// Unique identifier of the run
    pub run_id: Uuid,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// Keys loaded from the checkpoint file before reading input
    pub keys_cached: usize,

    /// Lines read from the input file
    pub lines_read: usize,

    /// Records skipped because their key was already checkpointed
    pub records_skipped: usize,

    /// Lines that failed to parse and were skipped
    pub parse_failures: usize,

    /// Records handed to the worker pool
    pub records_dispatched: usize,

    /// Task invocations that failed and were tolerated
    pub task_failures: usize,

    /// Keys appended to the checkpoint file
    pub records_checkpointed: u64,

    /// Total runtime in seconds
    pub runtime_secs: f64,

    /// Checkpointed records per second
    pub throughput_per_sec: f64,
}

impl RunStats {
    /// Start statistics for a new run.
    pub fn begin(run_id: Uuid) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            keys_cached: 0,
            lines_read: 0,
            records_skipped: 0,
            parse_failures: 0,
            records_dispatched: 0,
            task_failures: 0,
            records_checkpointed: 0,
            runtime_secs: 0.0,
            throughput_per_sec: 0.0,
        }
    }

    /// Calculate derived stats.
    pub fn finalize(&mut self, runtime_secs: f64) {
        self.runtime_secs = runtime_secs;
        if runtime_secs > 0.0 {
            self.throughput_per_sec = self.records_checkpointed as f64 / runtime_secs;
        }
    }
}
