//! On-disk persistence of fetched payloads.

use crate::error::StoreError;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// A payload written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedFile {
    pub path: PathBuf,
    pub size: u64,
}

/// Writes payloads to uniquely named files in one directory and reads them
/// back.
#[derive(Clone, Debug)]
pub struct DiskStore {
    dir: PathBuf,
    prefix: String,
    suffix: String,
}

impl DiskStore {
    /// Files are created as `<dir>/<prefix><random><suffix>`.
    pub fn new(
        dir: impl Into<PathBuf>,
        prefix: impl Into<String>,
        suffix: impl Into<String>,
    ) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist `payload` under a freshly generated file name.
    ///
    /// File creation, cleanup and `keep` run on the blocking pool. A failed
    /// write leaves no file behind.
    pub async fn write(&self, key: &str, payload: &[u8]) -> Result<SavedFile, StoreError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| StoreError::Create {
                dir: self.dir.clone(),
                source,
            })?;

        let dir = self.dir.clone();
        let prefix = self.prefix.clone();
        let suffix = self.suffix.clone();
        let (std_file, temp_path) = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix(&prefix)
                .suffix(&suffix)
                .tempfile_in(&dir)
                .map(|temp| temp.into_parts())
                .map_err(|source| StoreError::Create { dir, source })
        })
        .await??;
        debug!("Cache file for {} created at {}", key, temp_path.display());

        let mut file = tokio::fs::File::from_std(std_file);
        let written = match file.write_all(payload).await {
            Ok(()) => file.flush().await,
            Err(e) => Err(e),
        };
        drop(file);

        if let Err(source) = written {
            let path = temp_path.to_path_buf();
            discard(temp_path).await;
            return Err(StoreError::Io { path, source });
        }

        let path = tokio::task::spawn_blocking(move || {
            temp_path.keep().map_err(|e| StoreError::Io {
                path: e.path.to_path_buf(),
                source: e.error,
            })
        })
        .await??;

        Ok(SavedFile {
            path,
            size: payload.len() as u64,
        })
    }

    /// Read a whole cache file.
    ///
    /// `size` is the length recorded at write time; a file whose length no
    /// longer matches is still returned, with a warning.
    pub async fn read(&self, path: &Path, size: u64) -> Result<Bytes, StoreError> {
        let data = tokio::fs::read(path).await.map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        if data.len() as u64 != size {
            warn!(
                "Cache file {} is {} bytes, expected {}",
                path.display(),
                data.len(),
                size
            );
        }

        Ok(Bytes::from(data))
    }
}

/// Remove a partially written file off the async workers.
async fn discard(temp_path: TempPath) {
    let path = temp_path.to_path_buf();
    match tokio::task::spawn_blocking(move || temp_path.close()).await {
        Ok(Ok(())) => debug!("Removed partial cache file {}", path.display()),
        Ok(Err(e)) => warn!("Failed to remove partial cache file {}: {}", path.display(), e),
        Err(e) => warn!("Cleanup task for {} failed: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> DiskStore {
        DiskStore::new(dir.path(), "tile-", ".png")
    }

    #[tokio::test]
    async fn write_then_read_returns_same_bytes() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let saved = store.write("/1/2/3", &[0x89, 0x50, 0x4E, 0x47]).await.unwrap();
        assert_eq!(saved.size, 4);

        let bytes = store.read(&saved.path, saved.size).await.unwrap();
        assert_eq!(&bytes[..], &[0x89, 0x50, 0x4E, 0x47]);
    }

    #[tokio::test]
    async fn file_name_uses_prefix_and_suffix() {
        let dir = TempDir::new().unwrap();
        let saved = store(&dir).write("/1/2/3", b"tile").await.unwrap();

        let name = saved.path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("tile-"), "unexpected name {}", name);
        assert!(name.ends_with(".png"), "unexpected name {}", name);
        assert_eq!(saved.path.parent(), Some(dir.path()));
    }

    #[tokio::test]
    async fn writes_for_different_keys_never_share_a_path() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let a = store.write("/1/2/3", b"a").await.unwrap();
        let b = store.write("/4/5/6", b"b").await.unwrap();
        assert_ne!(a.path, b.path);
        assert_eq!(&store.read(&a.path, 1).await.unwrap()[..], b"a");
        assert_eq!(&store.read(&b.path, 1).await.unwrap()[..], b"b");
    }

    #[tokio::test]
    async fn write_creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("nested").join("cache");
        let store = DiskStore::new(&nested, "tile-", ".png");

        let saved = store.write("/1/2/3", b"tile").await.unwrap();
        assert!(saved.path.starts_with(&nested));
    }

    #[tokio::test]
    async fn unusable_directory_is_a_create_error() {
        let dir = TempDir::new().unwrap();
        let blocked = dir.path().join("not-a-dir");
        std::fs::write(&blocked, b"").unwrap();

        let result = DiskStore::new(&blocked, "tile-", ".png").write("/1/2/3", b"tile").await;
        assert!(matches!(result, Err(StoreError::Create { .. })));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn concurrent_writes_finish_on_a_single_worker() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let writes = (0..32).map(|i| {
            let store = store.clone();
            async move { store.write(&format!("/{}/0/0", i), b"tile").await }
        });
        let saved = futures_util::future::join_all(writes).await;

        let mut paths: Vec<_> = saved.into_iter().map(|s| s.unwrap().path).collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 32);

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 32);
    }

    #[tokio::test]
    async fn read_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let result = store(&dir).read(&dir.path().join("gone.png"), 4).await;
        assert!(matches!(result, Err(StoreError::Io { .. })));
    }

    #[tokio::test]
    async fn read_tolerates_size_mismatch() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let saved = store.write("/1/2/3", b"tile").await.unwrap();

        let bytes = store.read(&saved.path, 99).await.unwrap();
        assert_eq!(&bytes[..], b"tile");
    }
}
