//! Error types for batchwork.
//!
//! Every variant here is fatal to a run. Recoverable failures (parse and task
//! errors under continue-on-error) are logged and counted by the stage that
//! saw them and never become a `BatchError`.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for batchwork.
#[derive(Debug, Error)]
pub enum BatchError {
    // ═══════════════════════════════════════════════════════════════════
    // Caller collaborators failed
    // ═══════════════════════════════════════════════════════════════════

    #[error("Configuration error: {0}")]
    Config(#[from] super::ConfigError),

    #[error("Failed to parse line {line} of {path}: {source}")]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to derive key for record {record}: {source}")]
    KeyDerivation {
        record: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Task failed on worker {worker_id} for record {record}: {source}")]
    Task {
        worker_id: usize,
        record: String,
        #[source]
        source: anyhow::Error,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Infrastructure failures
    // ═══════════════════════════════════════════════════════════════════

    #[error("IO error {context} {path}: {source}")]
    Io {
        context: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Consequences of another stage failing
    // ═══════════════════════════════════════════════════════════════════

    #[error("Processed records cache was never populated")]
    CacheUnavailable,

    #[error("Channel closed unexpectedly")]
    ChannelClosed,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BatchError {
    /// Create an IO error with context and the file involved.
    pub fn io(context: impl Into<String>, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            path: path.into(),
            source,
        }
    }

    /// Create a parse error for a line of the input file.
    pub fn parse(path: impl Into<PathBuf>, line: usize, source: anyhow::Error) -> Self {
        Self::Parse {
            path: path.into(),
            line,
            source,
        }
    }

    /// Create a key derivation error for a record.
    pub fn key_derivation(record: &impl std::fmt::Debug, source: anyhow::Error) -> Self {
        Self::KeyDerivation {
            record: format!("{record:?}"),
            source,
        }
    }

    /// Whether this error only reports that some other stage stopped first.
    ///
    /// The orchestrator prefers a non-secondary error as the cause of a
    /// failed run.
    pub fn is_secondary(&self) -> bool {
        matches!(self, Self::CacheUnavailable | Self::ChannelClosed)
    }
}

/// Result type alias for batchwork.
pub type Result<T> = std::result::Result<T, BatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secondary_errors() {
        assert!(BatchError::ChannelClosed.is_secondary());
        assert!(BatchError::CacheUnavailable.is_secondary());
        assert!(!BatchError::Internal("boom".to_string()).is_secondary());

        let io = BatchError::io(
            "opening",
            "done.dat",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(!io.is_secondary());
    }

    #[test]
    fn test_error_messages_carry_context() {
        let err = BatchError::parse("numbers.csv", 7, anyhow::anyhow!("not a number"));
        assert_eq!(
            err.to_string(),
            "Failed to parse line 7 of numbers.csv: not a number"
        );

        let err = BatchError::key_derivation(&(1, 2), anyhow::anyhow!("no key"));
        assert_eq!(err.to_string(), "Failed to derive key for record (1, 2): no key");
    }
}
