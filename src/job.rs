//! The seam between the pipeline and the caller's business logic.

use async_trait::async_trait;
use std::fmt::Debug;

/// Caller-supplied logic for one kind of batch.
///
/// The pipeline never looks inside a record. It parses lines into records,
/// keys them for resumability and hands each unprocessed one to `execute`.
#[async_trait]
pub trait BatchJob: Send + Sync + 'static {
    /// The parsed unit of work.
    type Record: Debug + Send + Sync + 'static;

    /// Convert the delimited fields of one input line into a record.
    fn parse(&self, fields: &[&str]) -> anyhow::Result<Self::Record>;

    /// Derive the key that identifies a record across runs.
    ///
    /// Keys must be stable for the same logical record. Surrounding
    /// whitespace is ignored.
    fn key_for(&self, record: &Self::Record) -> anyhow::Result<String>;

    /// Perform the side effect for a record.
    async fn execute(&self, record: &Self::Record) -> anyhow::Result<()>;
}

/// Wraps a job so every derived key is trimmed before it is compared or stored.
pub(crate) struct TrimmedKeys<J>(pub(crate) J);

#[async_trait]
impl<J: BatchJob> BatchJob for TrimmedKeys<J> {
    type Record = J::Record;

    fn parse(&self, fields: &[&str]) -> anyhow::Result<Self::Record> {
        self.0.parse(fields)
    }

    fn key_for(&self, record: &Self::Record) -> anyhow::Result<String> {
        self.0.key_for(record).map(|key| key.trim().to_string())
    }

    async fn execute(&self, record: &Self::Record) -> anyhow::Result<()> {
        self.0.execute(record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Padded;

    #[async_trait]
    impl BatchJob for Padded {
        type Record = String;

        fn parse(&self, fields: &[&str]) -> anyhow::Result<String> {
            Ok(fields.join("|"))
        }

        fn key_for(&self, record: &String) -> anyhow::Result<String> {
            Ok(format!("  {record}\n"))
        }

        async fn execute(&self, _record: &String) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_trimmed_keys() {
        let job = TrimmedKeys(Padded);
        let record = job.parse(&["a", "b"]).unwrap();
        assert_eq!(record, "a|b");
        assert_eq!(job.key_for(&record).unwrap(), "a|b");
        assert!(job.execute(&record).await.is_ok());
    }
}
