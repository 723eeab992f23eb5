//! Recursive tree removal

use super::{ensure_directory, listtree, local, remove, DirEntry, StoragePath};
use crate::boost::{consume, eager, BoostExecutor};
use crate::error::{BlobSyncError, Result};
use futures::stream::{self, BoxStream, StreamExt};
use tracing::{debug, info};

struct Removal<'a> {
    root: StoragePath,
    removals: BoxStream<'a, Result<StoragePath>>,
    removed: usize,
}

/// Delete every file under `path`, yielding each removed path once.
///
/// Files are removed concurrently on `executor` while the listing is still
/// running, so paths arrive in no particular order. When nothing was
/// removed the root is checked once more to report whether it was missing
/// ([`BlobSyncError::NotFound`]) or a plain file
/// ([`BlobSyncError::NotADirectory`]); an existing empty local directory is
/// not an error. Local roots lose their remaining directories at the end.
pub fn rmtree_iterator<'a>(
    path: &StoragePath,
    executor: &'a BoostExecutor,
) -> BoxStream<'a, Result<StoragePath>> {
    let root = path.clone();
    let listing = eager(listtree(&root), executor.config().eager_buffer);

    let base = root.clone();
    let removals = executor
        .map_unordered(
            move |entry: Result<DirEntry>| {
                let base = base.clone();
                async move {
                    let file = base.join(&entry?.relpath);
                    remove(&file).await?;
                    debug!(path = %file, "removed");
                    Ok::<_, BlobSyncError>(file)
                }
            },
            listing,
        )
        .boxed();

    let state = Removal {
        root,
        removals,
        removed: 0,
    };
    stream::unfold(Some(state), |state| async move {
        let mut state = state?;
        match state.removals.next().await {
            Some(Ok(path)) => {
                state.removed += 1;
                Some((Ok(path), Some(state)))
            }
            Some(Err(err)) => Some((Err(err), None)),
            None => match finish(&state.root, state.removed).await {
                Ok(()) => None,
                Err(err) => Some((Err(err), None)),
            },
        }
    })
    .boxed()
}

async fn finish(root: &StoragePath, removed: usize) -> Result<()> {
    if removed == 0 {
        ensure_directory(root).await?;
    }
    if let Some(dir) = root.as_local() {
        local::remove_skeleton(dir).await?;
    }
    info!(path = %root, removed, "removed tree");
    Ok(())
}

/// Delete every file under `path`, returning how many were removed
pub async fn rmtree(path: &StoragePath, executor: &BoostExecutor) -> Result<usize> {
    consume(rmtree_iterator(path, executor)).await
}
