//! Durable record of completed keys.
//!
//! The writer is the only task that touches the checkpoint file. Each key is
//! flushed as soon as it is written so that a crash after a task completes
//! cannot lose its completed status.

use super::{KeySetGate, normalize_permissions};
use crate::job::BatchJob;
use crate::models::{BatchError, Result};
use crate::report::ProgressReporter;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Appends the key of every completed record to the checkpoint file.
pub struct CheckpointWriter<J: BatchJob> {
    path: PathBuf,
    job: Arc<J>,
    reporter: Arc<dyn ProgressReporter>,
    report_interval: Duration,
    started: Instant,
}

impl<J: BatchJob> CheckpointWriter<J> {
    /// Create a writer for the given checkpoint file.
    ///
    /// `started` is the run start time used for elapsed time in progress
    /// reports.
    pub fn new(
        path: impl Into<PathBuf>,
        job: Arc<J>,
        reporter: Arc<dyn ProgressReporter>,
        report_interval: Duration,
        started: Instant,
    ) -> Self {
        Self {
            path: path.into(),
            job,
            reporter,
            report_interval,
            started,
        }
    }

    /// Consume completed records until the queue closes.
    ///
    /// Returns the number of keys written once everything is flushed.
    pub async fn run(
        self,
        gate: KeySetGate,
        mut completed: mpsc::Receiver<J::Record>,
    ) -> Result<u64> {
        gate.wait().await?;

        debug!(path = %self.path.display(), "Starting checkpoint writer");

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| BatchError::io("opening for append", &self.path, e))?;

        normalize_permissions(&self.path).await?;

        let mut writer = BufWriter::new(file);
        let mut written = 0u64;
        let mut last_report = Instant::now();

        while let Some(record) = completed.recv().await {
            let key = self
                .job
                .key_for(&record)
                .map_err(|e| BatchError::key_derivation(&record, e))?;

            writer
                .write_all(format!("{key}\n").as_bytes())
                .await
                .map_err(|e| BatchError::io("writing to", &self.path, e))?;
            writer
                .flush()
                .await
                .map_err(|e| BatchError::io("flushing", &self.path, e))?;

            written += 1;

            if last_report.elapsed() >= self.report_interval {
                last_report = Instant::now();
                let reporter = Arc::clone(&self.reporter);
                let elapsed = self.started.elapsed();
                tokio::spawn(async move { reporter.report(written, elapsed) });
            }
        }

        writer
            .shutdown()
            .await
            .map_err(|e| BatchError::io("closing", &self.path, e))?;

        info!(records = written, "Checkpoint writer finished");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{KeySet, key_set_gate};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tempfile::TempDir;

    struct Words;

    #[async_trait]
    impl BatchJob for Words {
        type Record = String;

        fn parse(&self, fields: &[&str]) -> anyhow::Result<String> {
            Ok(fields.concat())
        }

        fn key_for(&self, record: &String) -> anyhow::Result<String> {
            if record.is_empty() {
                anyhow::bail!("empty record");
            }
            Ok(record.clone())
        }

        async fn execute(&self, _record: &String) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn writer(path: PathBuf, reporter: Arc<dyn ProgressReporter>) -> CheckpointWriter<Words> {
        CheckpointWriter::new(
            path,
            Arc::new(Words),
            reporter,
            Duration::from_millis(10),
            Instant::now(),
        )
    }

    #[tokio::test]
    async fn test_appends_keys() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("done.dat");
        std::fs::write(&path, "existing\n").unwrap();

        let (ready, gate) = key_set_gate();
        ready.fire(KeySet::new());

        let (tx, rx) = mpsc::channel(4);
        let handle = tokio::spawn(writer(path.clone(), Arc::new(|_: u64, _: Duration| {})).run(gate, rx));

        tx.send("a".to_string()).await.unwrap();
        tx.send("b".to_string()).await.unwrap();
        drop(tx);

        assert_eq!(handle.await.unwrap().unwrap(), 2);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "existing\na\nb\n");
    }

    #[tokio::test]
    async fn test_each_key_is_flushed_before_the_next_record() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("done.dat");

        let (ready, gate) = key_set_gate();
        ready.fire(KeySet::new());

        let (tx, rx) = mpsc::channel(1);
        let handle = tokio::spawn(writer(path.clone(), Arc::new(|_: u64, _: Duration| {})).run(gate, rx));

        tx.send("first".to_string()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\n");

        drop(tx);
        handle.await.unwrap().unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_checkpoint_file_is_world_writable() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let existing = temp_dir.path().join("existing.dat");
        std::fs::write(&existing, "a\n").unwrap();
        std::fs::set_permissions(&existing, std::fs::Permissions::from_mode(0o600)).unwrap();
        let created = temp_dir.path().join("created.dat");

        for path in [&existing, &created] {
            let (ready, gate) = key_set_gate();
            ready.fire(KeySet::new());
            let (tx, rx) = mpsc::channel(1);
            drop(tx);
            writer(path.clone(), Arc::new(|_: u64, _: Duration| {}))
                .run(gate, rx)
                .await
                .unwrap();

            let mode = std::fs::metadata(path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o666, "{}", path.display());
        }
    }

    #[tokio::test]
    async fn test_waits_for_gate() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("done.dat");

        let (ready, gate) = key_set_gate();
        let (tx, rx) = mpsc::channel(1);
        let handle = tokio::spawn(writer(path.clone(), Arc::new(|_: u64, _: Duration| {})).run(gate, rx));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!path.exists());

        ready.fire(KeySet::new());
        drop(tx);
        assert_eq!(handle.await.unwrap().unwrap(), 0);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_key_error_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("done.dat");

        let (ready, gate) = key_set_gate();
        ready.fire(KeySet::new());

        let (tx, rx) = mpsc::channel(1);
        let handle = tokio::spawn(writer(path, Arc::new(|_: u64, _: Duration| {})).run(gate, rx));
        tx.send(String::new()).await.unwrap();

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(BatchError::KeyDerivation { .. })));
    }

    #[tokio::test]
    async fn test_reports_progress() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("done.dat");

        let (ready, gate) = key_set_gate();
        ready.fire(KeySet::new());

        let reported = Arc::new(AtomicU64::new(0));
        let sink = Arc::clone(&reported);
        let reporter = Arc::new(move |records: u64, _elapsed: Duration| {
            sink.fetch_max(records, Ordering::SeqCst);
        });

        let (tx, rx) = mpsc::channel(1);
        let handle = tokio::spawn(writer(path, reporter).run(gate, rx));

        for i in 0..5 {
            tx.send(format!("key-{i}")).await.unwrap();
            tokio::time::sleep(Duration::from_millis(15)).await;
        }
        drop(tx);
        handle.await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(reported.load(Ordering::SeqCst) >= 1);
    }
}
