//! A small job used by the CLI: sums pairs of integers.
//!
//! Each input line holds two integers. The key of a pair is `a:b`, so a pair
//! is only ever summed once across runs.

use crate::job::BatchJob;
use anyhow::{Context, bail};
use async_trait::async_trait;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::debug;

/// Two numbers to be added.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pair {
    pub left: i64,
    pub right: i64,
}

/// Adds every pair it sees to a running total.
#[derive(Debug, Default)]
pub struct PairSum {
    total: AtomicI64,
}

impl PairSum {
    /// Create a job with a zero total.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of every pair processed so far.
    pub fn total(&self) -> i64 {
        self.total.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BatchJob for PairSum {
    type Record = Pair;

    fn parse(&self, fields: &[&str]) -> anyhow::Result<Pair> {
        let [left, right] = fields else {
            bail!("expected 2 fields, got {}", fields.len());
        };

        Ok(Pair {
            left: left
                .trim()
                .parse()
                .with_context(|| format!("reading {left:?} as left operand"))?,
            right: right
                .trim()
                .parse()
                .with_context(|| format!("reading {right:?} as right operand"))?,
        })
    }

    fn key_for(&self, pair: &Pair) -> anyhow::Result<String> {
        Ok(format!("{}:{}", pair.left, pair.right))
    }

    async fn execute(&self, pair: &Pair) -> anyhow::Result<()> {
        let sum = pair
            .left
            .checked_add(pair.right)
            .with_context(|| format!("{} + {} overflows", pair.left, pair.right))?;
        self.total
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |total| total.checked_add(sum))
            .map_err(|total| anyhow::anyhow!("adding {sum} to running total {total} overflows"))?;
        debug!(left = pair.left, right = pair.right, sum, "Added pair");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let job = PairSum::new();
        assert_eq!(
            job.parse(&["1", " 2 "]).unwrap(),
            Pair { left: 1, right: 2 }
        );
        assert!(job.parse(&["1"]).is_err());
        assert!(job.parse(&["1", "two"]).is_err());
        assert!(job.parse(&["1", "2", "3"]).is_err());
    }

    #[tokio::test]
    async fn test_execute_accumulates() {
        let job = PairSum::new();
        job.execute(&Pair { left: 1, right: 2 }).await.unwrap();
        job.execute(&Pair { left: 3, right: 4 }).await.unwrap();
        assert_eq!(job.total(), 10);
        assert_eq!(job.key_for(&Pair { left: 3, right: 4 }).unwrap(), "3:4");
    }

    #[tokio::test]
    async fn test_execute_rejects_overflow() {
        let job = PairSum::new();
        assert!(job.execute(&Pair { left: i64::MAX, right: 1 }).await.is_err());
        assert!(job.execute(&Pair { left: i64::MIN, right: -1 }).await.is_err());
        assert_eq!(job.total(), 0);

        job.execute(&Pair { left: i64::MAX, right: 0 }).await.unwrap();
        assert!(job.execute(&Pair { left: 1, right: 0 }).await.is_err());
        assert_eq!(job.total(), i64::MAX);
    }
}
