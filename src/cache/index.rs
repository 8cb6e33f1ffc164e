//! Concurrent key -> entry registry.
//!
//! This is where concurrent requests for the same key are coalesced: the
//! decision "someone is already downloading this" and the publication of a
//! new downloading entry happen under one `DashMap` shard lock, so exactly one
//! caller ever becomes the claimant for a key.

use super::entry::{CacheEntry, CacheStatus, FetchResult, PendingPayload};
use crate::error::FetchError;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::FutureExt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

/// Result of [`CacheIndex::lookup_or_claim`].
pub enum Lookup {
    /// The key is on disk.
    Saved { disk_path: PathBuf, size: u64 },
    /// Another caller is downloading the key; await its result.
    Downloading(PendingPayload),
    /// The caller now owns the download for this key.
    Claimed(Claim),
}

impl std::fmt::Debug for Lookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lookup::Saved { disk_path, size } => f
                .debug_struct("Saved")
                .field("disk_path", disk_path)
                .field("size", size)
                .finish(),
            Lookup::Downloading(_) => f.write_str("Downloading"),
            Lookup::Claimed(claim) => f.debug_tuple("Claimed").field(claim).finish(),
        }
    }
}

/// Exclusive right to download one key.
///
/// Resolving the claim delivers the outcome to every caller attached to the
/// entry. A claim dropped without being resolved releases the entry so the
/// key can be claimed again; attached callers observe
/// [`FetchError::Cancelled`].
pub struct Claim {
    key: String,
    pending: PendingPayload,
    sender: Option<oneshot::Sender<FetchResult>>,
    index: CacheIndex,
}

impl Claim {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Handle on the shared outcome, identical to what attached callers see.
    pub fn pending(&self) -> PendingPayload {
        self.pending.clone()
    }

    pub fn resolve(mut self, result: FetchResult) {
        if let Some(sender) = self.sender.take() {
            // Nobody listening is fine, the entry keeps its own receiver.
            let _ = sender.send(result);
        }
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        if self.sender.is_some() {
            warn!("Claim for {} dropped before resolving", self.key);
            self.index.release(&self.key);
        }
    }
}

impl std::fmt::Debug for Claim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Claim")
            .field("key", &self.key)
            .field("resolved", &self.sender.is_none())
            .finish()
    }
}

/// Thread-safe key -> [`CacheEntry`] map.
#[derive(Clone, Debug, Default)]
pub struct CacheIndex {
    entries: Arc<DashMap<String, CacheEntry>>,
}

impl CacheIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the existing entry for `key`, or atomically install a fresh
    /// `Downloading` entry and hand the caller the [`Claim`] for it.
    ///
    /// An entry in `Deleting` is replaced as if it were absent.
    pub fn lookup_or_claim(&self, key: &str) -> Lookup {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get();
                if let Some(pending) = entry.pending() {
                    debug!("Cache ATTACH for {}", key);
                    return Lookup::Downloading(pending);
                }
                if let (Some(disk_path), Some(size)) = (entry.disk_path(), entry.size()) {
                    debug!("Cache HIT for {}", key);
                    return Lookup::Saved {
                        disk_path: disk_path.to_path_buf(),
                        size,
                    };
                }

                debug!("Cache entry for {} is being deleted, claiming again", key);
                let (claim, entry) = self.new_claim(key);
                occupied.insert(entry);
                Lookup::Claimed(claim)
            }
            Entry::Vacant(vacant) => {
                debug!("Cache MISS for {}", key);
                let (claim, entry) = self.new_claim(key);
                vacant.insert(entry);
                Lookup::Claimed(claim)
            }
        }
    }

    fn new_claim(&self, key: &str) -> (Claim, CacheEntry) {
        let (sender, receiver) = oneshot::channel();
        let abandoned_key = key.to_string();
        let pending = receiver
            .map(move |received| {
                received.unwrap_or_else(|_| Err(FetchError::Cancelled(abandoned_key)))
            })
            .boxed()
            .shared();

        let claim = Claim {
            key: key.to_string(),
            pending: pending.clone(),
            sender: Some(sender),
            index: self.clone(),
        };
        (claim, CacheEntry::downloading(key, pending))
    }

    /// Record that `key` has been persisted at `disk_path`.
    ///
    /// Missing or non-downloading entries are left untouched.
    pub fn finalize(&self, key: &str, disk_path: PathBuf, size: u64) {
        match self.entries.get_mut(key) {
            Some(mut entry) => {
                if entry.mark_saved(disk_path, size) {
                    debug!("Cache entry for {} saved ({} bytes)", key, size);
                } else {
                    warn!(
                        "Cannot finalize {} from status {:?}",
                        key,
                        entry.status()
                    );
                }
            }
            None => error!("Cache record for {} is missing at finalize", key),
        }
    }

    /// Drop a `Downloading` entry so the next request for `key` claims it
    /// again. Returns whether an entry was removed.
    pub fn release(&self, key: &str) -> bool {
        let removed = self
            .entries
            .remove_if(key, |_, entry| entry.status() == CacheStatus::Downloading)
            .is_some();
        if removed {
            debug!("Released download claim for {}", key);
        }
        removed
    }

    /// Move a `Saved` entry to `Deleting` and return its file path.
    pub fn mark_deleting(&self, key: &str) -> Option<PathBuf> {
        self.entries.get_mut(key)?.mark_deleting()
    }

    /// Keys of all entries currently `Saved`.
    pub fn saved_keys(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|entry| entry.status() == CacheStatus::Saved)
            .map(|entry| entry.key().to_string())
            .collect()
    }

    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.entries.get(key).map(|entry| entry.clone())
    }

    pub fn status(&self, key: &str) -> Option<CacheStatus> {
        self.entries.get(key).map(|entry| entry.status())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
