//! Batch orchestration.
//!
//! Pipeline flow:
//! Input file → Reader (filtered by cached keys) → Worker Pool → Checkpoint Writer → checkpoint file

use super::reader::{ReadReport, UnprocessedReader};
use crate::checkpoint::{CheckpointWriter, key_set_gate, populate};
use crate::job::{BatchJob, TrimmedKeys};
use crate::models::{BatchConfig, BatchError, Result, RunStats};
use crate::pool::{WorkerPool, WorkerReport};
use crate::report::{LogReporter, ProgressReporter};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

/// Result of a pipeline stage that ran to completion.
enum Stage {
    Cache(usize),
    Reader(ReadReport),
    Pool(Vec<WorkerReport>),
    Writer(u64),
}

/// Resumable batch pipeline for one kind of job.
pub struct BatchPipeline<J: BatchJob> {
    config: BatchConfig,
    job: Arc<TrimmedKeys<J>>,
    reporter: Arc<dyn ProgressReporter>,
}

impl<J: BatchJob> BatchPipeline<J> {
    /// Create a pipeline, validating the configuration.
    pub fn new(config: BatchConfig, job: J) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            job: Arc::new(TrimmedKeys(job)),
            reporter: Arc::new(LogReporter),
        })
    }

    /// Replace the default progress sink.
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// The configuration this pipeline runs with.
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// The caller's job.
    pub fn job(&self) -> &J {
        &self.job.0
    }

    /// Process every record not yet checkpointed.
    ///
    /// Returns once all unprocessed records have been attempted and their
    /// keys flushed. On a fatal error every stage is stopped and the first
    /// root-cause error is returned.
    pub async fn run(&self) -> Result<RunStats> {
        let run_id = Uuid::new_v4();
        self.run_stages(run_id)
            .instrument(info_span!("batch", %run_id))
            .await
    }

    /// Run the batch, terminating the process on a fatal error.
    pub async fn run_or_exit(&self) -> RunStats {
        match self.run().await {
            Ok(stats) => stats,
            Err(e) => {
                error!(error = %e, "Terminating after fatal error");
                std::process::exit(1);
            }
        }
    }

    async fn run_stages(&self, run_id: Uuid) -> Result<RunStats> {
        let started = Instant::now();
        let mut stats = RunStats::begin(run_id);

        info!(
            input = %self.config.input_file.display(),
            checkpoint = %self.config.checkpoint_file.display(),
            workers = self.config.workers,
            "Starting batch record processing"
        );

        let capacity = self.config.queue_capacity();
        let (unprocessed_tx, unprocessed_rx) = mpsc::channel(capacity);
        let (completed_tx, completed_rx) = mpsc::channel(capacity);
        let (ready, gate) = key_set_gate();

        let mut stages: JoinSet<Result<Stage>> = JoinSet::new();

        let checkpoint_file = self.config.checkpoint_file.clone();
        stages.spawn(async move { populate(&checkpoint_file, ready).await.map(Stage::Cache) });

        let writer = CheckpointWriter::new(
            &self.config.checkpoint_file,
            Arc::clone(&self.job),
            Arc::clone(&self.reporter),
            self.config.progress_report_interval(),
            started,
        );
        let writer_gate = gate.clone();
        stages.spawn(async move { writer.run(writer_gate, completed_rx).await.map(Stage::Writer) });

        let reader = UnprocessedReader::new(
            &self.config.input_file,
            self.config.delimiter.clone(),
            self.config.continue_on_error,
            Arc::clone(&self.job),
        );
        stages.spawn(async move { reader.run(gate, unprocessed_tx).await.map(Stage::Reader) });

        let pool = WorkerPool::new(
            Arc::clone(&self.job),
            self.config.workers,
            self.config.min_record_processing_time(),
            self.config.continue_on_error,
        );
        let workers = pool.start(unprocessed_rx, completed_tx);
        stages.spawn(async move { workers.wait().await.map(Stage::Pool) });

        let mut fatal: Option<BatchError> = None;

        while let Some(joined) = stages.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) if e.is_cancelled() => continue,
                Err(e) => Err(BatchError::Internal(format!("Pipeline stage panicked: {e}"))),
            };

            match outcome {
                Ok(Stage::Cache(keys)) => stats.keys_cached = keys,
                Ok(Stage::Reader(read)) => {
                    stats.lines_read = read.lines_read;
                    stats.records_skipped = read.records_skipped;
                    stats.parse_failures = read.parse_failures;
                    stats.records_dispatched = read.records_dispatched;
                }
                Ok(Stage::Pool(reports)) => {
                    stats.task_failures = reports.iter().map(|r| r.failed).sum();
                }
                Ok(Stage::Writer(written)) => stats.records_checkpointed = written,
                Err(e) => {
                    if fatal.is_none() {
                        stages.abort_all();
                    }
                    fatal = match fatal {
                        Some(cause) if !cause.is_secondary() => Some(cause),
                        _ => Some(e),
                    };
                }
            }
        }

        if let Some(e) = fatal {
            error!(error = %e, "Batch record processing failed");
            return Err(e);
        }

        stats.finalize(started.elapsed().as_secs_f64());

        info!(
            checkpointed = stats.records_checkpointed,
            skipped = stats.records_skipped,
            runtime = format!("{:.2}s", stats.runtime_secs),
            "Batch record processing completed"
        );

        Ok(stats)
    }
}
