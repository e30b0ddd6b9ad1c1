//! Worker pool for record processing.
//!
//! Workers share one input queue, run the job's task on each record and
//! forward finished records to the checkpoint writer. An optional minimum
//! processing time throttles each worker to one record per interval.

use crate::job::BatchJob;
use crate::models::{BatchError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tracing::{error, info, warn};

/// Base used to spread worker start times when no throttle is configured.
const DEFAULT_STAGGER_BASE: Duration = Duration::from_secs(1);

/// What a single worker did before it stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub worker_id: usize,
    pub processed: usize,
    pub failed: usize,
}

/// Fixed-size pool of workers.
pub struct WorkerPool<J: BatchJob> {
    job: Arc<J>,
    workers: usize,
    min_processing_time: Option<Duration>,
    continue_on_error: bool,
}

impl<J: BatchJob> WorkerPool<J> {
    /// Create a new worker pool.
    pub fn new(
        job: Arc<J>,
        workers: usize,
        min_processing_time: Option<Duration>,
        continue_on_error: bool,
    ) -> Self {
        Self {
            job,
            workers: workers.max(1),
            min_processing_time,
            continue_on_error,
        }
    }

    /// Delay before worker `worker_id` (1-indexed) takes its first record.
    pub fn stagger_for(&self, worker_id: usize) -> Duration {
        let base = self.min_processing_time.unwrap_or(DEFAULT_STAGGER_BASE);
        let nanos = base.as_nanos() / self.workers as u128 * worker_id as u128;
        Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
    }

    /// Spawn every worker.
    ///
    /// Each worker owns a clone of `completed`; the queue closes once the
    /// last worker exits.
    pub fn start(
        &self,
        input: mpsc::Receiver<J::Record>,
        completed: mpsc::Sender<J::Record>,
    ) -> PoolHandle {
        let input = Arc::new(Mutex::new(input));
        let mut set = JoinSet::new();

        for worker_id in 1..=self.workers {
            let worker = Worker {
                id: worker_id,
                job: Arc::clone(&self.job),
                input: Arc::clone(&input),
                completed: completed.clone(),
                stagger: self.stagger_for(worker_id),
                min_processing_time: self.min_processing_time,
                continue_on_error: self.continue_on_error,
            };
            set.spawn(worker.run());
        }

        PoolHandle { set }
    }
}

/// Running workers of a pool.
pub struct PoolHandle {
    set: JoinSet<Result<WorkerReport>>,
}

impl PoolHandle {
    /// Wait for every worker to exit.
    ///
    /// The first failing worker aborts the rest.
    pub async fn wait(mut self) -> Result<Vec<WorkerReport>> {
        let mut reports = Vec::new();

        while let Some(joined) = self.set.join_next().await {
            let outcome = joined
                .map_err(|e| BatchError::Internal(format!("Worker panicked: {e}")))
                .and_then(|result| result);

            match outcome {
                Ok(report) => reports.push(report),
                Err(e) => {
                    self.set.abort_all();
                    return Err(e);
                }
            }
        }

        reports.sort_by_key(|r| r.worker_id);
        Ok(reports)
    }
}

struct Worker<J: BatchJob> {
    id: usize,
    job: Arc<J>,
    input: Arc<Mutex<mpsc::Receiver<J::Record>>>,
    completed: mpsc::Sender<J::Record>,
    stagger: Duration,
    min_processing_time: Option<Duration>,
    continue_on_error: bool,
}

impl<J: BatchJob> Worker<J> {
    async fn run(self) -> Result<WorkerReport> {
        let mut report = WorkerReport {
            worker_id: self.id,
            ..Default::default()
        };

        info!(
            worker_id = self.id,
            delay_ms = self.stagger.as_millis() as u64,
            "Starting worker"
        );

        // The first tick is the staggered start; the second bounds the first record.
        let mut throttle = ticker(self.stagger);
        throttle.tick().await;
        let mut throttle_reset = false;

        loop {
            let next = self.input.lock().await.recv().await;
            let Some(record) = next else { break };

            if let Err(e) = self.job.execute(&record).await {
                if !self.continue_on_error {
                    error!(worker_id = self.id, record = ?record, error = %e, "Task failed");
                    return Err(BatchError::Task {
                        worker_id: self.id,
                        record: format!("{record:?}"),
                        source: e,
                    });
                }
                warn!(worker_id = self.id, record = ?record, error = %e, "Task failed, continuing");
                report.failed += 1;
            }

            self.completed
                .send(record)
                .await
                .map_err(|_| BatchError::ChannelClosed)?;
            report.processed += 1;

            if let Some(min) = self.min_processing_time {
                throttle.tick().await;

                if !throttle_reset {
                    throttle = ticker(min);
                    throttle_reset = true;
                }
            }
        }

        info!(
            worker_id = self.id,
            processed = report.processed,
            "Worker stopped"
        );
        Ok(report)
    }
}

/// A timer whose first tick is one `period` from now.
fn ticker(period: Duration) -> Interval {
    let period = period.max(Duration::from_nanos(1));
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}
