//! Parallel ranged reads
//!
//! Large blobs are fetched as many concurrent byte-range requests through a
//! [`BoostExecutor`]; the ordered variant reassembles them into a plain
//! sequential chunk stream.

use super::{getsize, read_byte_range, StoragePath};
use crate::boost::BoostExecutor;
use crate::error::{BlobSyncError, Result};
use futures::stream::{self, BoxStream, StreamExt};
use std::ops::Range;

/// Split `size` bytes into consecutive ranges of at most `chunk_size` bytes
pub fn byte_ranges(size: u64, chunk_size: usize) -> Vec<Range<u64>> {
    let chunk = chunk_size.max(1) as u64;
    (0..size)
        .step_by(chunk as usize)
        .map(|start| start..(start + chunk).min(size))
        .collect()
}

async fn resolve_size(path: &StoragePath, size: Option<u64>) -> Result<u64> {
    match size {
        Some(size) => Ok(size),
        None => getsize(path).await,
    }
}

/// Read the file at `path` with concurrent range requests, in order.
///
/// Chunks are `executor.config().chunk_size` bytes and arrive in file
/// order. Slots are shared with everything else running on `executor`.
pub async fn read_stream_boosted<'a>(
    path: &StoragePath,
    executor: &'a BoostExecutor,
    size: Option<u64>,
) -> Result<BoxStream<'a, Result<Vec<u8>>>> {
    let size = resolve_size(path, size).await?;
    let ranges = byte_ranges(size, executor.config().chunk_size);
    tracing::debug!(path = %path, size, chunks = ranges.len(), "boosted read");

    let path = path.clone();
    let chunks = executor.map_ordered(
        move |range: Range<u64>| {
            let path = path.clone();
            async move { read_byte_range(&path, range).await }
        },
        stream::iter(ranges),
    );
    Ok(chunks.boxed())
}

/// Read the file at `path` with concurrent range requests, as they finish.
///
/// Each chunk comes with the byte range it covers.
pub async fn read_stream_unordered<'a>(
    path: &StoragePath,
    executor: &'a BoostExecutor,
    size: Option<u64>,
) -> Result<BoxStream<'a, Result<(Vec<u8>, Range<u64>)>>> {
    let size = resolve_size(path, size).await?;
    let ranges = byte_ranges(size, executor.config().chunk_size);

    let path = path.clone();
    let chunks = executor.map_unordered(
        move |range: Range<u64>| {
            let path = path.clone();
            async move {
                let data = read_byte_range(&path, range.clone()).await?;
                Ok::<_, BlobSyncError>((data, range))
            }
        },
        stream::iter(ranges),
    );
    Ok(chunks.boxed())
}
