//! Host-side staging directories, one per slot

use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::Result;

/// Create a fresh, uniquely named directory under `root`
pub(crate) async fn allocate(root: &Path) -> Result<PathBuf> {
    let dir = root.join(uuid::Uuid::new_v4().to_string());
    tokio::fs::create_dir_all(&dir).await?;
    Ok(dir)
}

/// Delete a workspace directory. A missing directory is fine; other
/// failures are logged and swallowed.
pub(crate) async fn remove(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to delete workspace {}: {}", dir.display(), e),
    }
}
