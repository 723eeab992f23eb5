//! Local filesystem backend
//!
//! Tree listing walks the directory with `walkdir` on the blocking pool and
//! streams entries back through a bounded channel; file I/O goes through
//! `tokio::fs`.

use super::{DirEntry, Stat};
use crate::error::{BlobSyncError, IoResultExt, Result};
use futures::future;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::io;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use walkdir::WalkDir;

/// Entries buffered between the walker thread and the consumer
const LISTING_BUFFER: usize = 256;

/// Stream every regular file under `root`.
///
/// Symlinks are not followed and are not listed.
pub(super) fn listtree(root: PathBuf) -> BoxStream<'static, Result<DirEntry>> {
    let (tx, rx) = mpsc::channel(LISTING_BUFFER);

    let walker = tokio::task::spawn_blocking(move || {
        for entry in WalkDir::new(&root).follow_links(false) {
            let item = match entry {
                Ok(entry) if entry.depth() == 0 => {
                    if entry.file_type().is_dir() {
                        continue;
                    }
                    Err(BlobSyncError::NotADirectory(root.display().to_string()))
                }
                Ok(entry) if entry.file_type().is_file() => to_dir_entry(&root, &entry),
                Ok(_) => continue,
                Err(err) => Err(walk_error(&root, err)),
            };

            let failed = item.is_err();
            if tx.blocking_send(item).is_err() || failed {
                break;
            }
        }
    });

    channel_stream(rx, walker)
}

/// Items sent by a blocking producer, then its failure if it did not finish
fn channel_stream<T: Send + 'static>(
    mut rx: mpsc::Receiver<Result<T>>,
    producer: JoinHandle<()>,
) -> BoxStream<'static, Result<T>> {
    let items = stream::poll_fn(move |cx| rx.poll_recv(cx));
    let outcome = stream::once(producer).filter_map(|joined| {
        future::ready(joined.err().map(|err| Err(BlobSyncError::from(err))))
    });
    items.chain(outcome).boxed()
}

fn to_dir_entry(root: &Path, entry: &walkdir::DirEntry) -> Result<DirEntry> {
    let metadata = entry
        .metadata()
        .map_err(|err| walk_error(entry.path(), err))?;
    let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());

    Ok(DirEntry {
        relpath: to_relpath(relative),
        size: metadata.len(),
        mtime: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        is_dir: metadata.is_dir(),
    })
}

/// Slash-separated form of a relative path, whatever the platform separator
fn to_relpath(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn walk_error(root: &Path, err: walkdir::Error) -> BlobSyncError {
    let path = err
        .path()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| root.to_path_buf());
    match err.into_io_error() {
        Some(source) => BlobSyncError::io(path, source),
        None => BlobSyncError::io(
            path,
            io::Error::new(io::ErrorKind::Other, "filesystem loop detected"),
        ),
    }
}

pub(super) async fn stat(path: &Path) -> Result<Stat> {
    let metadata = tokio::fs::metadata(path).await.with_path(path)?;
    if metadata.is_dir() {
        return Err(BlobSyncError::IsADirectory(path.display().to_string()));
    }
    Ok(Stat {
        size: metadata.len(),
        mtime: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
    })
}

pub(super) async fn is_file(path: &Path) -> Result<bool> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => Ok(metadata.is_file()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(BlobSyncError::io(path, err)),
    }
}

pub(super) async fn is_dir(path: &Path) -> Result<bool> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => Ok(metadata.is_dir()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(BlobSyncError::io(path, err)),
    }
}

pub(super) async fn remove(path: &Path) -> Result<()> {
    if is_dir(path).await? {
        return Err(BlobSyncError::IsADirectory(path.display().to_string()));
    }
    tokio::fs::remove_file(path).await.with_path(path)
}

pub(super) async fn remove_skeleton(path: &Path) -> Result<()> {
    tokio::fs::remove_dir_all(path).await.with_path(path)
}

pub(super) async fn read_range(path: &Path, range: Range<u64>) -> Result<Vec<u8>> {
    let mut file = tokio::fs::File::open(path).await.with_path(path)?;
    file.seek(io::SeekFrom::Start(range.start))
        .await
        .with_path(path)?;

    let file_len = file.metadata().await.with_path(path)?.len();
    let len = range.end.saturating_sub(range.start);
    let mut buffer = Vec::with_capacity(len.min(file_len.saturating_sub(range.start)) as usize);
    file.take(len)
        .read_to_end(&mut buffer)
        .await
        .with_path(path)?;
    Ok(buffer)
}

/// Sequential chunk stream over the whole file
pub(super) fn read_stream(path: PathBuf, chunk_size: usize) -> BoxStream<'static, Result<Vec<u8>>> {
    stream::try_unfold((path, None), move |(path, file)| read_next_chunk(path, file, chunk_size))
        .boxed()
}

type ChunkState = (PathBuf, Option<tokio::fs::File>);

async fn read_next_chunk(
    path: PathBuf,
    file: Option<tokio::fs::File>,
    chunk_size: usize,
) -> Result<Option<(Vec<u8>, ChunkState)>> {
    let mut file = match file {
        Some(file) => file,
        None => tokio::fs::File::open(&path).await.with_path(&path)?,
    };

    let mut chunk = Vec::with_capacity(chunk_size);
    (&mut file)
        .take(chunk_size as u64)
        .read_to_end(&mut chunk)
        .await
        .with_path(&path)?;

    if chunk.is_empty() {
        return Ok(None);
    }
    Ok(Some((chunk, (path, Some(file)))))
}

pub(super) async fn write_stream<S>(path: &Path, mut chunks: S) -> Result<u64>
where
    S: Stream<Item = Result<Vec<u8>>> + Unpin,
{
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.with_path(parent)?;
    }

    let mut file = tokio::fs::File::create(path).await.with_path(path)?;
    let mut written = 0u64;
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await.with_path(path)?;
        written += chunk.len() as u64;
    }
    file.flush().await.with_path(path)?;

    Ok(written)
}
