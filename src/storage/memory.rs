//! In-process object store
//!
//! A flat key → blob map with the semantics of a cloud blob service:
//! directories do not exist on their own, a "directory" is any key prefix
//! ending in `/`, and every request can carry simulated latency. Useful
//! for tests and as the reference for how remote backends behave.

use super::{DirEntry, Stat};
use crate::error::{BlobSyncError, Result};
use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, SystemTime};

/// URL scheme used when displaying memory paths
pub const MEMORY_SCHEME: &str = "memory://";

#[derive(Debug, Clone)]
struct Blob {
    data: Arc<Vec<u8>>,
    mtime: SystemTime,
}

#[derive(Debug, Default)]
struct StoreInner {
    blobs: RwLock<BTreeMap<String, Blob>>,
    latency: Option<Duration>,
    requests: AtomicU64,
}

/// Shared handle to an in-memory blob store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
}

impl MemoryStore {
    /// Create an empty store with no simulated latency
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store that sleeps `latency` on every request
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                latency: Some(latency),
                ..Default::default()
            }),
        }
    }

    /// Path to `key` in this store
    pub fn path(&self, key: impl Into<String>) -> super::StoragePath {
        super::StoragePath::Memory(MemoryPath {
            store: self.clone(),
            key: key.into(),
        })
    }

    /// Store a blob directly, bypassing latency and request accounting
    pub fn put(&self, key: impl Into<String>, data: impl Into<Vec<u8>>) {
        let blob = Blob {
            data: Arc::new(data.into()),
            mtime: SystemTime::now(),
        };
        self.write_blobs().insert(key.into(), blob);
    }

    /// Fetch a blob directly
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.read_blobs().get(key).map(|blob| blob.data.as_ref().clone())
    }

    /// All keys, sorted
    pub fn keys(&self) -> Vec<String> {
        self.read_blobs().keys().cloned().collect()
    }

    /// Number of blobs
    pub fn len(&self) -> usize {
        self.read_blobs().len()
    }

    /// Whether the store holds no blobs
    pub fn is_empty(&self) -> bool {
        self.read_blobs().is_empty()
    }

    /// Number of simulated requests served so far
    pub fn request_count(&self) -> u64 {
        self.inner.requests.load(Ordering::Relaxed)
    }

    fn read_blobs(&self) -> RwLockReadGuard<'_, BTreeMap<String, Blob>> {
        self.inner.blobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_blobs(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Blob>> {
        self.inner.blobs.write().unwrap_or_else(PoisonError::into_inner)
    }

    async fn request(&self) {
        self.inner.requests.fetch_add(1, Ordering::Relaxed);
        if let Some(latency) = self.inner.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

/// A key within a [`MemoryStore`]
#[derive(Debug, Clone)]
pub struct MemoryPath {
    store: MemoryStore,
    key: String,
}

impl PartialEq for MemoryPath {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.store.inner, &other.store.inner) && self.key == other.key
    }
}

impl Eq for MemoryPath {}

impl MemoryPath {
    /// The store this path lives in
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// The blob key
    pub fn key(&self) -> &str {
        &self.key
    }

    pub(super) fn same_store(&self, other: &MemoryPath) -> bool {
        Arc::ptr_eq(&self.store.inner, &other.store.inner)
    }

    pub(super) fn with_key(&self, key: String) -> Self {
        Self {
            store: self.store.clone(),
            key,
        }
    }

    /// Keys ending in `/` (and the store root) name directories
    pub fn is_directory_like(&self) -> bool {
        self.key.is_empty() || self.key.ends_with('/')
    }

    pub(super) fn directory_prefix(&self) -> String {
        if self.is_directory_like() {
            self.key.clone()
        } else {
            format!("{}/", self.key)
        }
    }

    fn not_found(&self) -> BlobSyncError {
        BlobSyncError::NotFound(self.to_string())
    }

    pub(super) async fn list(&self) -> Result<Vec<DirEntry>> {
        self.store.request().await;
        let prefix = self.directory_prefix();
        let blobs = self.store.read_blobs();
        let entries = blobs
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            // A blob named exactly like the prefix is a directory marker
            .filter(|(key, _)| key.len() > prefix.len())
            .map(|(key, blob)| DirEntry {
                relpath: key[prefix.len()..].to_string(),
                size: blob.data.len() as u64,
                mtime: blob.mtime,
                is_dir: false,
            })
            .collect();
        Ok(entries)
    }

    /// Whether any blob lives under this path taken as a directory
    pub(super) async fn has_children(&self) -> Result<bool> {
        self.store.request().await;
        let prefix = self.directory_prefix();
        let blobs = self.store.read_blobs();
        let found = blobs
            .range(prefix.clone()..)
            .next()
            .is_some_and(|(key, _)| key.starts_with(&prefix));
        Ok(found)
    }

    pub(super) async fn stat(&self) -> Result<Stat> {
        if self.is_directory_like() {
            return Err(BlobSyncError::IsADirectory(self.to_string()));
        }
        self.store.request().await;
        let blobs = self.store.read_blobs();
        let blob = blobs.get(&self.key).ok_or_else(|| self.not_found())?;
        Ok(Stat {
            size: blob.data.len() as u64,
            mtime: blob.mtime,
        })
    }

    pub(super) async fn is_file(&self) -> Result<bool> {
        if self.is_directory_like() {
            return Ok(false);
        }
        self.store.request().await;
        Ok(self.store.read_blobs().contains_key(&self.key))
    }

    pub(super) async fn remove(&self) -> Result<()> {
        if self.is_directory_like() {
            return Err(BlobSyncError::IsADirectory(self.to_string()));
        }
        self.store.request().await;
        match self.store.write_blobs().remove(&self.key) {
            Some(_) => Ok(()),
            None => Err(self.not_found()),
        }
    }

    pub(super) async fn read_range(&self, range: Range<u64>) -> Result<Vec<u8>> {
        if self.is_directory_like() {
            return Err(BlobSyncError::IsADirectory(self.to_string()));
        }
        self.store.request().await;
        let data = {
            let blobs = self.store.read_blobs();
            let blob = blobs.get(&self.key).ok_or_else(|| self.not_found())?;
            Arc::clone(&blob.data)
        };
        let len = data.len() as u64;
        let start = range.start.min(len) as usize;
        let end = range.end.min(len).max(range.start.min(len)) as usize;
        Ok(data[start..end].to_vec())
    }

    pub(super) async fn write(&self, data: Vec<u8>) -> Result<()> {
        if self.is_directory_like() {
            return Err(BlobSyncError::IsADirectory(self.to_string()));
        }
        self.store.request().await;
        let blob = Blob {
            data: Arc::new(data),
            mtime: SystemTime::now(),
        };
        self.store.write_blobs().insert(self.key.clone(), blob);
        Ok(())
    }
}

impl std::fmt::Display for MemoryPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", MEMORY_SCHEME, self.key)
    }
}
