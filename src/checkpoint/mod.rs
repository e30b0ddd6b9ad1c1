//! Checkpointing for resumable runs.
//!
//! Provides:
//! - `KeySet`: keys completed by earlier runs, gated by a one-shot ready signal
//! - `CheckpointWriter`: the single writer that appends completed keys

mod keyset;
mod writer;

pub use keyset::*;
pub use writer::*;

use crate::models::{BatchError, Result};
use std::path::Path;

/// Make the checkpoint file readable and writable by everyone.
#[cfg(unix)]
pub(crate) async fn normalize_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o666))
        .await
        .map_err(|e| BatchError::io("setting permissions on", path, e))
}

#[cfg(not(unix))]
pub(crate) async fn normalize_permissions(path: &Path) -> Result<()> {
    let mut permissions = tokio::fs::metadata(path)
        .await
        .map_err(|e| BatchError::io("reading permissions of", path, e))?
        .permissions();
    permissions.set_readonly(false);

    tokio::fs::set_permissions(path, permissions)
        .await
        .map_err(|e| BatchError::io("setting permissions on", path, e))
}
