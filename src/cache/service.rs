//! Read / download / serve orchestration.

use super::index::{CacheIndex, Claim, Lookup};
use super::store::DiskStore;
use super::sweeper::{self, SweepReport};
use crate::error::Result;
use crate::origin::OriginFetcher;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Disk-backed cache in front of an [`OriginFetcher`].
///
/// Each key is fetched from origin at most once while it stays cached;
/// concurrent requests for a key that is still downloading share the one
/// fetch. Fetched payloads are written to disk in the background and later
/// requests are served from the file.
#[derive(Clone)]
pub struct CacheService {
    index: CacheIndex,
    store: DiskStore,
    fetcher: Arc<dyn OriginFetcher>,
    /// Background disk writes, awaited on shutdown.
    writes: TaskTracker,
}

impl CacheService {
    pub fn new(store: DiskStore, fetcher: Arc<dyn OriginFetcher>) -> Self {
        Self {
            index: CacheIndex::new(),
            store,
            fetcher,
            writes: TaskTracker::new(),
        }
    }

    pub fn index(&self) -> &CacheIndex {
        &self.index
    }

    pub fn store(&self) -> &DiskStore {
        &self.store
    }

    /// Get the payload for `key`, from disk, from an in-flight download, or
    /// by starting a new download.
    ///
    /// Dropping the returned future does not cancel a download other callers
    /// may be waiting on.
    pub async fn get_file(&self, key: &str) -> Result<Bytes> {
        match self.index.lookup_or_claim(key) {
            Lookup::Saved { disk_path, size } => {
                crate::metrics::record_lookup("hit");
                debug!("Reading {} from {}", key, disk_path.display());
                Ok(self.store.read(&disk_path, size).await?)
            }
            Lookup::Downloading(pending) => {
                crate::metrics::record_lookup("attach");
                debug!("{} is already downloading, waiting for it", key);
                Ok(pending.await?)
            }
            Lookup::Claimed(claim) => {
                crate::metrics::record_lookup("miss");
                let pending = claim.pending();
                self.spawn_download(claim);
                Ok(pending.await?)
            }
        }
    }

    /// Run the origin fetch for a fresh claim on its own task so it completes
    /// regardless of which callers are still waiting.
    fn spawn_download(&self, claim: Claim) {
        let fetcher = self.fetcher.clone();
        let index = self.index.clone();
        let store = self.store.clone();
        let writes = self.writes.clone();

        tokio::spawn(async move {
            let key = claim.key().to_string();
            debug!("New file to cache, downloading {}", key);
            crate::metrics::record_origin_fetch();

            let result = fetcher.fetch(&key).await;
            match &result {
                Ok(payload) => {
                    writes.spawn(persist(index, store, key, payload.clone()));
                }
                Err(e) => {
                    crate::metrics::record_origin_error();
                    warn!("Origin fetch for {} failed: {}", key, e);
                    // Release before waking waiters so a retry claims afresh.
                    index.release(&key);
                }
            }
            claim.resolve(result);
        });
    }

    /// Wait up to `grace` for background writes, then delete every cache
    /// file.
    pub async fn shutdown(&self, grace: Duration) -> SweepReport {
        info!("Proxy server is finishing work, deleting cache files");
        self.writes.close();
        if tokio::time::timeout(grace, self.writes.wait()).await.is_err() {
            warn!(
                "{} cache writes still running after {:?}, sweeping anyway",
                self.writes.len(),
                grace
            );
        }
        sweeper::sweep(&self.index).await
    }
}

async fn persist(index: CacheIndex, store: DiskStore, key: String, payload: Bytes) {
    match store.write(&key, &payload).await {
        Ok(saved) => index.finalize(&key, saved.path, saved.size),
        Err(e) => {
            crate::metrics::record_persist_error();
            error!("Error saving cache file for {}: {}", key, e);
            index.release(&key);
        }
    }
}
