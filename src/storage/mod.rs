//! Storage backends
//!
//! Every primitive the copy and sync engines consume (listing, stat, read,
//! write, remove) is dispatched over the closed set of backends in
//! [`StoragePath`]. Adding a backend means adding a variant; the compiler
//! then points at every operation that must learn about it.

mod delete;
mod local;
mod memory;
mod read;

pub use delete::{rmtree, rmtree_iterator};
pub use memory::{MemoryPath, MemoryStore, MEMORY_SCHEME};
pub use read::{byte_ranges, read_stream_boosted, read_stream_unordered};

use crate::error::{BlobSyncError, Result};
use futures::stream::{self, BoxStream, Stream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// One file found while listing a tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// Slash-separated path relative to the listed root
    pub relpath: String,
    /// File size in bytes
    pub size: u64,
    /// Modification time
    pub mtime: SystemTime,
    /// Is this a directory?
    pub is_dir: bool,
}

/// File metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    /// File size in bytes
    pub size: u64,
    /// Modification time
    pub mtime: SystemTime,
}

/// A location on one of the supported backends
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoragePath {
    /// Local filesystem path
    Local(PathBuf),
    /// Key in an in-process object store
    Memory(MemoryPath),
}

impl StoragePath {
    /// Local filesystem path
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self::Local(path.into())
    }

    /// Child of this path at slash-separated `relpath`
    pub fn join(&self, relpath: &str) -> Self {
        match self {
            Self::Local(path) => Self::Local(
                relpath
                    .split('/')
                    .filter(|part| !part.is_empty())
                    .fold(path.clone(), |acc, part| acc.join(part)),
            ),
            Self::Memory(path) => {
                Self::Memory(path.with_key(format!("{}{}", path.directory_prefix(), relpath)))
            }
        }
    }

    /// Slash-separated path of `self` below `base`, if it is below it
    pub fn relative_to(&self, base: &StoragePath) -> Option<String> {
        match (self, base) {
            (Self::Local(path), Self::Local(base)) => {
                let relative = path.strip_prefix(base).ok()?;
                Some(
                    relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/"),
                )
            }
            (Self::Memory(path), Self::Memory(base)) if path.same_store(base) => path
                .key()
                .strip_prefix(&base.directory_prefix())
                .map(str::to_string),
            _ => None,
        }
    }

    /// Whether the path syntactically names a directory
    pub fn is_directory_like(&self) -> bool {
        match self {
            Self::Local(path) => path.as_os_str().to_string_lossy().ends_with('/'),
            Self::Memory(path) => path.is_directory_like(),
        }
    }

    /// The same location, spelled as a directory
    pub fn ensure_directory_like(&self) -> Self {
        match self {
            Self::Local(path) => Self::Local(path.clone()),
            Self::Memory(path) => Self::Memory(path.with_key(path.directory_prefix())),
        }
    }

    /// Local filesystem path, if this is one
    pub fn as_local(&self) -> Option<&Path> {
        match self {
            Self::Local(path) => Some(path),
            Self::Memory(_) => None,
        }
    }
}

impl From<PathBuf> for StoragePath {
    fn from(path: PathBuf) -> Self {
        Self::Local(path)
    }
}

impl From<&Path> for StoragePath {
    fn from(path: &Path) -> Self {
        Self::Local(path.to_path_buf())
    }
}

impl std::fmt::Display for StoragePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Memory(path) => write!(f, "{}", path),
        }
    }
}

/// Stream every file below `path`, in no particular order.
///
/// Relative paths in the entries are relative to `path`. Listing a missing
/// local root fails with not-found; an object-store prefix with nothing
/// under it simply lists nothing.
pub fn listtree(path: &StoragePath) -> BoxStream<'static, Result<DirEntry>> {
    match path {
        StoragePath::Local(path) => local::listtree(path.clone()),
        StoragePath::Memory(path) => {
            let path = path.clone();
            stream::once(async move { path.list().await })
                .map_ok(|entries| stream::iter(entries.into_iter().map(Ok::<_, BlobSyncError>)))
                .try_flatten()
                .boxed()
        }
    }
}

/// Size and modification time of the file at `path`
pub async fn stat(path: &StoragePath) -> Result<Stat> {
    match path {
        StoragePath::Local(path) => local::stat(path).await,
        StoragePath::Memory(path) => path.stat().await,
    }
}

/// Size in bytes of the file at `path`
pub async fn getsize(path: &StoragePath) -> Result<u64> {
    Ok(stat(path).await?.size)
}

/// Whether a file exists at `path`
pub async fn is_file(path: &StoragePath) -> Result<bool> {
    match path {
        StoragePath::Local(path) => local::is_file(path).await,
        StoragePath::Memory(path) => path.is_file().await,
    }
}

/// Succeed if `path` is an existing directory.
///
/// Only called after a listing came back empty, to tell an empty directory
/// from a missing one or a file.
pub async fn ensure_directory(path: &StoragePath) -> Result<()> {
    let exists = match path {
        StoragePath::Local(local_path) => local::is_dir(local_path).await?,
        StoragePath::Memory(memory_path) => memory_path.has_children().await?,
    };
    if exists {
        return Ok(());
    }

    let as_file = match path {
        StoragePath::Memory(memory_path) => StoragePath::Memory(
            memory_path.with_key(memory_path.key().trim_end_matches('/').to_string()),
        ),
        StoragePath::Local(_) => path.clone(),
    };
    if is_file(&as_file).await? {
        Err(BlobSyncError::NotADirectory(path.to_string()))
    } else {
        Err(BlobSyncError::NotFound(path.to_string()))
    }
}

/// Delete the file at `path`
pub async fn remove(path: &StoragePath) -> Result<()> {
    match path {
        StoragePath::Local(path) => local::remove(path).await,
        StoragePath::Memory(path) => path.remove().await,
    }
}

/// Read `range` of the file at `path`; the range is clamped to the file
pub async fn read_byte_range(path: &StoragePath, range: Range<u64>) -> Result<Vec<u8>> {
    match path {
        StoragePath::Local(path) => local::read_range(path, range).await,
        StoragePath::Memory(path) => path.read_range(range).await,
    }
}

/// Read the file at `path` as a sequential stream of `chunk_size` chunks.
///
/// `size` saves a stat request on backends that need one.
pub fn read_stream(
    path: &StoragePath,
    chunk_size: usize,
    size: Option<u64>,
) -> BoxStream<'static, Result<Vec<u8>>> {
    match path {
        StoragePath::Local(path) => local::read_stream(path.clone(), chunk_size),
        StoragePath::Memory(path) => {
            let path = path.clone();
            stream::once(async move {
                let size = match size {
                    Some(size) => size,
                    None => path.stat().await?.size,
                };
                let chunks = stream::iter(byte_ranges(size, chunk_size)).then(move |range| {
                    let path = path.clone();
                    async move { path.read_range(range).await }
                });
                Ok::<_, BlobSyncError>(chunks)
            })
            .try_flatten()
            .boxed()
        }
    }
}

/// Write `chunks` to `path`, replacing any existing file.
///
/// Fails with [`BlobSyncError::SizeMismatch`] when the stream does not
/// carry exactly `size` bytes.
pub async fn write_stream<S>(path: &StoragePath, chunks: S, size: u64) -> Result<()>
where
    S: Stream<Item = Result<Vec<u8>>> + Unpin,
{
    if path.is_directory_like() {
        return Err(BlobSyncError::IsADirectory(path.to_string()));
    }

    let written = match path {
        StoragePath::Local(local_path) => local::write_stream(local_path, chunks).await?,
        StoragePath::Memory(memory_path) => {
            let data: Vec<Vec<u8>> = chunks.try_collect().await?;
            let data = data.concat();
            let written = data.len() as u64;
            if written == size {
                memory_path.write(data).await?;
            }
            written
        }
    };

    if written != size {
        return Err(BlobSyncError::SizeMismatch {
            path: path.to_string(),
            expected: size,
            actual: written,
        });
    }
    Ok(())
}

/// Copy the file at `src` to `dst`, streaming `chunk_size` chunks.
///
/// Returns the number of bytes copied.
pub async fn copy(
    src: &StoragePath,
    dst: &StoragePath,
    chunk_size: usize,
    size: Option<u64>,
) -> Result<u64> {
    let size = match size {
        Some(size) => size,
        None => getsize(src).await?,
    };
    let chunks = read_stream(src, chunk_size, Some(size));
    write_stream(dst, chunks, size).await?;
    tracing::trace!(src = %src, dst = %dst, size, "copied");
    Ok(size)
}
