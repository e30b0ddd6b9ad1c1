//! Configuration models for batchwork.
//!
//! Everything a run can be tuned with lives here. The config can be built in
//! code or loaded from a TOML file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for a single batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Number of workers processing records in parallel
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Minimum time each worker spends on a single record.
    /// Zero or absent disables throttling.
    #[serde(rename = "min_record_processing_ms", default, with = "optional_millis")]
    pub min_processing_time: Option<Duration>,

    /// How often progress is reported
    #[serde(
        rename = "progress_report_interval_ms",
        default = "default_progress_report_interval",
        with = "millis"
    )]
    pub report_interval: Duration,

    /// File containing the records to process
    pub input_file: PathBuf,

    /// Field delimiter used to split input lines
    #[serde(default = "default_delimiter")]
    pub delimiter: String,

    /// File holding one key per processed record
    pub checkpoint_file: PathBuf,

    /// Keep going when a line fails to parse or a task returns an error
    #[serde(default)]
    pub continue_on_error: bool,
}

fn default_workers() -> usize {
    1
}

fn default_progress_report_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_delimiter() -> String {
    ",".to_string()
}

impl BatchConfig {
    /// Create a config for the given files with every other option defaulted.
    pub fn new(input_file: impl Into<PathBuf>, checkpoint_file: impl Into<PathBuf>) -> Self {
        Self {
            workers: default_workers(),
            min_processing_time: None,
            report_interval: default_progress_report_interval(),
            input_file: input_file.into(),
            delimiter: default_delimiter(),
            checkpoint_file: checkpoint_file.into(),
            continue_on_error: false,
        }
    }

    /// Set the number of workers.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the minimum per-record processing time.
    pub fn with_min_record_processing_time(mut self, min: Duration) -> Self {
        self.min_processing_time = Some(min);
        self
    }

    /// Set the progress report interval.
    pub fn with_progress_report_interval(mut self, interval: Duration) -> Self {
        self.report_interval = interval;
        self
    }

    /// Set the input field delimiter.
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    /// Set the continue-on-error policy.
    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Minimum per-record processing time, if throttling is enabled.
    pub fn min_record_processing_time(&self) -> Option<Duration> {
        self.min_processing_time.filter(|min| !min.is_zero())
    }

    /// Interval between progress reports.
    pub fn progress_report_interval(&self) -> Duration {
        self.report_interval
    }

    /// Capacity of both inter-stage queues.
    pub fn queue_capacity(&self) -> usize {
        self.workers * 2
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_owned(),
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Check the options that cannot be expressed in the types.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.delimiter.is_empty() {
            return Err(ConfigError::Invalid(
                "delimiter must not be empty".to_string(),
            ));
        }
        if self.report_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "progress_report_interval_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Durations are written as whole milliseconds in config files.
///
/// Serializing rounds up so a sub-millisecond duration never turns into zero.
mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn to_millis(duration: &Duration) -> u64 {
        u64::try_from(duration.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX)
    }

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(to_millis(duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod optional_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        duration: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match duration {
            Some(duration) => serializer.serialize_some(&super::millis::to_millis(duration)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = BatchConfig::new("in.csv", "done.dat");
        assert_eq!(config.workers, 1);
        assert_eq!(config.delimiter, ",");
        assert_eq!(config.progress_report_interval(), Duration::from_secs(1));
        assert_eq!(config.min_record_processing_time(), None);
        assert!(!config.continue_on_error);
        assert_eq!(config.queue_capacity(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_min_time_disables_throttle() {
        let mut config = BatchConfig::new("in.csv", "done.dat");
        config.min_processing_time = Some(Duration::ZERO);
        assert_eq!(config.min_record_processing_time(), None);

        let config = config.with_min_record_processing_time(Duration::from_millis(250));
        assert_eq!(
            config.min_record_processing_time(),
            Some(Duration::from_millis(250))
        );
    }

    #[test]
    fn test_sub_millisecond_min_time_keeps_throttling() {
        let config = BatchConfig::new("in.csv", "done.dat")
            .with_min_record_processing_time(Duration::from_micros(500))
            .with_progress_report_interval(Duration::from_micros(250));

        assert_eq!(
            config.min_record_processing_time(),
            Some(Duration::from_micros(500))
        );
        assert_eq!(config.progress_report_interval(), Duration::from_micros(250));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_serialized_durations_round_up_to_millis() {
        let config = BatchConfig::new("in.csv", "done.dat")
            .with_min_record_processing_time(Duration::from_micros(500))
            .with_progress_report_interval(Duration::from_millis(1500));

        let text = toml::to_string(&config).unwrap();
        assert!(text.contains("min_record_processing_ms = 1\n"));
        assert!(text.contains("progress_report_interval_ms = 1500\n"));

        let reloaded: BatchConfig = toml::from_str(&text).unwrap();
        assert_eq!(
            reloaded.min_record_processing_time(),
            Some(Duration::from_millis(1))
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = BatchConfig::new("in.csv", "done.dat").with_workers(0);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = BatchConfig::new("in.csv", "done.dat").with_delimiter("");
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = BatchConfig::new("in.csv", "done.dat")
            .with_progress_report_interval(Duration::ZERO);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
workers = 4
min_record_processing_ms = 500
input_file = "data/numbers.csv"
checkpoint_file = "data/done.dat"
delimiter = ";"
continue_on_error = true
"#
        )
        .unwrap();

        let config = BatchConfig::from_file(file.path()).unwrap();
        assert_eq!(config.workers, 4);
        assert_eq!(
            config.min_record_processing_time(),
            Some(Duration::from_millis(500))
        );
        assert_eq!(config.input_file, PathBuf::from("data/numbers.csv"));
        assert_eq!(config.delimiter, ";");
        assert!(config.continue_on_error);
        assert_eq!(config.report_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_from_file_errors() {
        let missing = BatchConfig::from_file(Path::new("/nonexistent/batchwork.toml"));
        assert!(matches!(missing, Err(ConfigError::FileRead { .. })));

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "workers = \"many\"").unwrap();
        let invalid = BatchConfig::from_file(file.path());
        assert!(matches!(invalid, Err(ConfigError::Parse { .. })));
    }
}
