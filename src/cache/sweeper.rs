//! Best-effort removal of cache files on shutdown.

use super::index::CacheIndex;
use std::io::ErrorKind;
use tracing::{debug, info, warn};

/// Outcome of one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub deleted: usize,
    /// Files that were already gone.
    pub missing: usize,
    pub failed: usize,
}

/// Delete the file behind every `Saved` entry.
///
/// Each entry is moved to `Deleting` before its file is removed, so a request
/// racing the sweep re-fetches instead of reading a vanishing file. Entries
/// still downloading have no file and are skipped. Failures are logged and
/// never retried.
pub async fn sweep(index: &CacheIndex) -> SweepReport {
    let mut report = SweepReport::default();

    for key in index.saved_keys() {
        let Some(path) = index.mark_deleting(&key) else {
            continue;
        };

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Deleted cache file {} for {}", path.display(), key);
                report.deleted += 1;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Cache file {} for {} was already gone", path.display(), key);
                report.missing += 1;
            }
            Err(e) => {
                warn!("Failed to delete cache file {}: {}", path.display(), e);
                report.failed += 1;
            }
        }
    }

    info!(
        "Cache sweep finished: {} deleted, {} missing, {} failed",
        report.deleted, report.missing, report.failed
    );
    report
}
