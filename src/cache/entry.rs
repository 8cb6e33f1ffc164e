//! Per-key cache record.

use crate::error::FetchError;
use bytes::Bytes;
use futures_util::future::{BoxFuture, Shared};
use std::fmt;
use std::path::{Path, PathBuf};

/// Outcome of one origin fetch, as observed by every attached caller.
pub type FetchResult = Result<Bytes, FetchError>;

/// Multi-consumer handle on an in-flight download.
///
/// Every clone resolves to the same value; the payload is fetched once.
pub type PendingPayload = Shared<BoxFuture<'static, FetchResult>>;

/// Lifecycle status of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Claimed, origin fetch or disk write still running.
    Downloading,
    /// Persisted to disk; reads go to the file.
    Saved,
    /// File removal has been requested; lookups treat the key as a miss.
    Deleting,
}

/// State carried by an entry. `pending` only exists while downloading and the
/// disk location only exists once saved.
#[derive(Clone)]
enum EntryState {
    Downloading { pending: PendingPayload },
    Saved { disk_path: PathBuf, size: u64 },
    Deleting { disk_path: PathBuf },
}

#[derive(Clone)]
pub struct CacheEntry {
    key: String,
    state: EntryState,
}

impl CacheEntry {
    pub(crate) fn downloading(key: &str, pending: PendingPayload) -> Self {
        Self {
            key: key.to_string(),
            state: EntryState::Downloading { pending },
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn status(&self) -> CacheStatus {
        match self.state {
            EntryState::Downloading { .. } => CacheStatus::Downloading,
            EntryState::Saved { .. } => CacheStatus::Saved,
            EntryState::Deleting { .. } => CacheStatus::Deleting,
        }
    }

    /// Shared download handle, `None` once the entry has left `Downloading`.
    pub fn pending(&self) -> Option<PendingPayload> {
        match &self.state {
            EntryState::Downloading { pending } => Some(pending.clone()),
            _ => None,
        }
    }

    /// Location of the persisted payload, set only while `Saved`.
    pub fn disk_path(&self) -> Option<&Path> {
        match &self.state {
            EntryState::Saved { disk_path, .. } => Some(disk_path),
            _ => None,
        }
    }

    pub fn size(&self) -> Option<u64> {
        match self.state {
            EntryState::Saved { size, .. } => Some(size),
            _ => None,
        }
    }

    /// `Downloading` -> `Saved`. Returns `false` and leaves the entry alone
    /// from any other state.
    pub(crate) fn mark_saved(&mut self, disk_path: PathBuf, size: u64) -> bool {
        if !matches!(self.state, EntryState::Downloading { .. }) {
            return false;
        }
        self.state = EntryState::Saved { disk_path, size };
        true
    }

    /// `Saved` -> `Deleting`, yielding the path that should be removed.
    pub(crate) fn mark_deleting(&mut self) -> Option<PathBuf> {
        let EntryState::Saved { disk_path, .. } = &self.state else {
            return None;
        };
        let disk_path = disk_path.clone();
        self.state = EntryState::Deleting {
            disk_path: disk_path.clone(),
        };
        Some(disk_path)
    }
}

impl fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("CacheEntry");
        s.field("key", &self.key).field("status", &self.status());
        match &self.state {
            EntryState::Saved { disk_path, size } => {
                s.field("disk_path", disk_path).field("size", size);
            }
            EntryState::Deleting { disk_path } => {
                s.field("disk_path", disk_path);
            }
            EntryState::Downloading { .. } => {}
        }
        s.finish()
    }
}
