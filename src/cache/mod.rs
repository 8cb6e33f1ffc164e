//! Disk-backed, request-coalescing payload cache.

pub mod entry;
pub mod index;
pub mod service;
pub mod store;
pub mod sweeper;

pub use entry::{CacheEntry, CacheStatus, FetchResult, PendingPayload};
pub use index::{CacheIndex, Claim, Lookup};
pub use service::CacheService;
pub use store::{DiskStore, SavedFile};
pub use sweeper::SweepReport;
