//! In-memory cache of keys already written to the checkpoint file.
//!
//! The cache is populated once, before any input is filtered, and is
//! read-only afterwards. Readiness is broadcast through a one-shot gate so
//! the reader and writer can start concurrently and block until it opens.

use crate::models::{BatchError, Result};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{debug, info};

/// Keys of records completed by earlier runs.
#[derive(Debug, Default, Clone)]
pub struct KeySet {
    keys: HashSet<String>,
}

impl KeySet {
    /// Create an empty key set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a key was checkpointed by an earlier run.
    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether no keys are cached.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn insert(&mut self, key: String) {
        self.keys.insert(key);
    }

    /// Load every non-empty line of a checkpoint file.
    ///
    /// A missing file yields an empty set.
    pub async fn load(path: &Path) -> Result<Self> {
        let mut set = Self::new();

        if !tokio::fs::try_exists(path)
            .await
            .map_err(|e| BatchError::io("checking", path, e))?
        {
            info!(path = %path.display(), "No previously processed records, skipping cache population");
            return Ok(set);
        }

        super::normalize_permissions(path).await?;

        let file = File::open(path)
            .await
            .map_err(|e| BatchError::io("opening for read", path, e))?;
        let mut lines = BufReader::new(file).lines();

        debug!(path = %path.display(), "Populating processed records cache");

        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| BatchError::io("reading", path, e))?
        {
            let key = line.trim();
            if !key.is_empty() {
                set.insert(key.to_string());
            }
        }

        info!(keys = set.len(), "Populated processed records cache");
        Ok(set)
    }
}

/// Fires the gate once the key set is fully populated.
pub struct KeySetReady {
    tx: watch::Sender<Option<Arc<KeySet>>>,
}

/// Waits for the key set to become available.
#[derive(Clone)]
pub struct KeySetGate {
    rx: watch::Receiver<Option<Arc<KeySet>>>,
}

/// Create a connected ready signal and gate.
pub fn key_set_gate() -> (KeySetReady, KeySetGate) {
    let (tx, rx) = watch::channel(None);
    (KeySetReady { tx }, KeySetGate { rx })
}

impl KeySetReady {
    /// Publish the key set and release every waiter.
    ///
    /// Consumes the signal, so it can only fire once.
    pub fn fire(self, keys: KeySet) {
        // Waiters may already be gone if the run was aborted.
        let _ = self.tx.send(Some(Arc::new(keys)));
    }
}

impl KeySetGate {
    /// Block until the key set is published.
    ///
    /// Fails with `CacheUnavailable` if the signal is dropped without firing.
    pub async fn wait(mut self) -> Result<Arc<KeySet>> {
        let ready = self
            .rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| BatchError::CacheUnavailable)?;

        ready.clone().ok_or(BatchError::CacheUnavailable)
    }
}

/// Load the checkpoint file and open the gate.
///
/// On failure the signal is dropped unfired and the error is returned to the
/// caller; no partially populated set is ever published.
pub async fn populate(path: &Path, ready: KeySetReady) -> Result<usize> {
    let keys = KeySet::load(path).await?;
    let count = keys.len();
    ready.fire(keys);
    debug!("Processed records cache ready");
    Ok(count)
}
