//! Applying sync plans
//!
//! Every action of a plan runs as one task on the executor. Copies fetch
//! their source with ranged reads on the same executor, so a single large
//! file still gets every slot left free.

use super::diff::{sync_iterator, CopyAction, DeleteAction, SyncAction, SyncOptions, SyncPlan};
use crate::boost::BoostExecutor;
use crate::error::{BlobSyncError, Result};
use crate::storage::{read_stream_boosted, remove, write_stream, StoragePath};
use futures::future;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde::Serialize;
use tracing::{debug, info};

/// Counts from a finished sync
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    /// Files copied
    pub copied: usize,
    /// Files deleted
    pub deleted: usize,
    /// Bytes copied
    pub bytes_copied: u64,
}

impl SyncSummary {
    /// Total number of applied actions
    pub fn actions(&self) -> usize {
        self.copied + self.deleted
    }

    fn record(mut self, action: &SyncAction) -> Self {
        match action {
            SyncAction::Copy(copy) => {
                self.copied += 1;
                self.bytes_copied += copy.size;
            }
            SyncAction::Delete(_) => self.deleted += 1,
        }
        self
    }
}

impl std::fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "copied {} files ({}), deleted {} files",
            self.copied,
            humansize::format_size(self.bytes_copied, humansize::BINARY),
            self.deleted
        )
    }
}

async fn apply_action(
    src: &StoragePath,
    dst: &StoragePath,
    action: SyncAction,
    executor: &BoostExecutor,
) -> Result<SyncAction> {
    match &action {
        SyncAction::Copy(CopyAction { relpath, size }) => {
            let chunks = read_stream_boosted(&src.join(relpath), executor, Some(*size)).await?;
            write_stream(&dst.join(relpath), chunks, *size).await?;
        }
        SyncAction::Delete(DeleteAction { relpath }) => {
            remove(&dst.join(relpath)).await?;
        }
    }
    debug!(action = %action, "applied");
    Ok(action)
}

fn apply_plan<'a>(
    plan: SyncPlan,
    src: StoragePath,
    dst: StoragePath,
    executor: &'a BoostExecutor,
) -> BoxStream<'a, Result<SyncAction>> {
    executor
        .map_unordered(
            move |action: SyncAction| {
                let src = src.clone();
                let dst = dst.clone();
                async move { apply_action(&src, &dst, action, executor).await }
            },
            stream::iter(plan),
        )
        .boxed()
}

fn sync_actions<'a>(
    src: &StoragePath,
    dst: &StoragePath,
    executor: &'a BoostExecutor,
    options: SyncOptions,
) -> BoxStream<'a, Result<SyncAction>> {
    let (src, dst) = (src.clone(), dst.clone());
    stream::once(async move {
        let plan = sync_iterator(&src, &dst, options).await?;
        Ok::<_, BlobSyncError>(apply_plan(plan, src, dst, executor))
    })
    .try_flatten()
    .boxed()
}

/// Bring `dst` in line with `src`, yielding each path as it is applied.
///
/// Actions run concurrently on `executor`, so paths arrive in completion
/// order. The first failure ends the stream; actions already applied stay
/// applied and a rerun picks up what is left.
pub fn sync<'a>(
    src: &StoragePath,
    dst: &StoragePath,
    executor: &'a BoostExecutor,
    options: SyncOptions,
) -> BoxStream<'a, Result<String>> {
    sync_actions(src, dst, executor, options)
        .map_ok(|action| match action {
            SyncAction::Copy(CopyAction { relpath, .. })
            | SyncAction::Delete(DeleteAction { relpath }) => relpath,
        })
        .boxed()
}

/// Run a whole sync and summarize what it did
pub async fn sync_all(
    src: &StoragePath,
    dst: &StoragePath,
    executor: &BoostExecutor,
    options: SyncOptions,
) -> Result<SyncSummary> {
    let summary = sync_actions(src, dst, executor, options)
        .try_fold(SyncSummary::default(), |summary, action| {
            future::ready(Ok(summary.record(&action)))
        })
        .await?;
    info!(src = %src, dst = %dst, %summary, "sync complete");
    Ok(summary)
}
