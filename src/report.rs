//! Progress sinks for the checkpoint writer.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tracing::info;

/// Receives periodic progress from a running batch.
pub trait ProgressReporter: Send + Sync {
    /// Called with the number of records checkpointed so far and the time
    /// since the run started.
    fn report(&self, records: u64, elapsed: Duration);
}

impl<F> ProgressReporter for F
where
    F: Fn(u64, Duration) + Send + Sync,
{
    fn report(&self, records: u64, elapsed: Duration) {
        self(records, elapsed)
    }
}

/// Reports progress through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ProgressReporter for LogReporter {
    fn report(&self, records: u64, elapsed: Duration) {
        info!(
            records,
            elapsed_ms = elapsed.as_millis() as u64,
            "Processed {} records in {:.1}s",
            records,
            elapsed.as_secs_f64()
        );
    }
}

/// Reports progress on a terminal spinner.
///
/// The total is unknown up front, so this shows a running count rather than
/// a bar.
pub struct SpinnerReporter {
    spinner: ProgressBar,
}

impl SpinnerReporter {
    /// Create and start a spinner.
    pub fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) =
            ProgressStyle::default_spinner().template("[{elapsed_precise}] {spinner} {msg}")
        {
            spinner.set_style(style);
        }
        spinner.enable_steady_tick(Duration::from_millis(120));
        Self { spinner }
    }

    /// Stop the spinner, leaving a final message.
    pub fn finish(&self, records: u64) {
        self.spinner
            .finish_with_message(format!("Done! {records} records checkpointed"));
    }
}

impl Default for SpinnerReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for SpinnerReporter {
    fn report(&self, records: u64, elapsed: Duration) {
        self.spinner.set_message(format!(
            "{records} records checkpointed ({:.0}/s)",
            records as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
        ));
    }
}
