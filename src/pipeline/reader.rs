//! Reads the input file and feeds records that still need processing.

use crate::checkpoint::KeySetGate;
use crate::job::BatchJob;
use crate::models::{BatchError, Result};
use std::borrow::Cow;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const BYTE_ORDER_MARK: char = '\u{feff}';

/// Counts gathered while reading the input file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadReport {
    pub lines_read: usize,
    pub records_skipped: usize,
    pub parse_failures: usize,
    pub records_dispatched: usize,
}

/// Parses input lines and forwards records whose key is not yet checkpointed.
pub struct UnprocessedReader<J: BatchJob> {
    path: PathBuf,
    delimiter: String,
    continue_on_error: bool,
    job: Arc<J>,
}

impl<J: BatchJob> UnprocessedReader<J> {
    /// Create a reader for the given input file.
    pub fn new(
        path: impl Into<PathBuf>,
        delimiter: impl Into<String>,
        continue_on_error: bool,
        job: Arc<J>,
    ) -> Self {
        Self {
            path: path.into(),
            delimiter: delimiter.into(),
            continue_on_error,
            job,
        }
    }

    /// Read the whole input, sending unprocessed records to `out`.
    ///
    /// Dropping `out` on return closes the queue for the workers.
    pub async fn run(self, gate: KeySetGate, out: mpsc::Sender<J::Record>) -> Result<ReadReport> {
        let processed = gate.wait().await?;

        info!(path = %self.path.display(), "Reading unprocessed records");

        let file = File::open(&self.path)
            .await
            .map_err(|e| BatchError::io("opening", &self.path, e))?;
        let mut input = BufReader::new(file);
        let mut buf = Vec::new();
        let mut report = ReadReport::default();

        loop {
            buf.clear();
            let n = input
                .read_until(b'\n', &mut buf)
                .await
                .map_err(|e| BatchError::io("reading", &self.path, e))?;
            if n == 0 {
                break;
            }

            report.lines_read += 1;
            let line_number = report.lines_read;

            let text = String::from_utf8_lossy(trim_line_ending(&buf));
            if matches!(text, Cow::Owned(_)) {
                debug!(line = line_number, "Replaced invalid UTF-8 in line");
            }
            let line = match line_number {
                1 => text.strip_prefix(BYTE_ORDER_MARK).unwrap_or(&*text),
                _ => &*text,
            };

            let fields: Vec<&str> = line.split(self.delimiter.as_str()).collect();

            let record = match self.job.parse(&fields) {
                Ok(record) => record,
                Err(e) if self.continue_on_error => {
                    warn!(
                        path = %self.path.display(),
                        line = line_number,
                        error = %e,
                        "Failed to parse line, skipping"
                    );
                    report.parse_failures += 1;
                    continue;
                }
                Err(e) => return Err(BatchError::parse(&self.path, line_number, e)),
            };

            let key = self
                .job
                .key_for(&record)
                .map_err(|e| BatchError::key_derivation(&record, e))?;

            if processed.contains(&key) {
                report.records_skipped += 1;
                continue;
            }

            out.send(record)
                .await
                .map_err(|_| BatchError::ChannelClosed)?;
            report.records_dispatched += 1;
        }

        info!(
            lines = report.lines_read,
            dispatched = report.records_dispatched,
            skipped = report.records_skipped,
            "Finished reading unprocessed records"
        );

        Ok(report)
    }
}

/// Strip a trailing `\n` or `\r\n`.
fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
