//! Tree diffing
//!
//! Lists source and destination concurrently and merge-joins the two sorted
//! listings into the minimal set of copy and delete actions. Files are
//! compared by size only; content is never read.

use crate::boost::eager;
use crate::config::DEFAULT_EAGER_BUFFER;
use crate::error::Result;
use crate::storage::{ensure_directory, listtree, DirEntry, StoragePath};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::iter::{FusedIterator, Peekable};
use std::vec;
use tracing::debug;

/// Copy a file from source to destination
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CopyAction {
    /// Path relative to both roots
    pub relpath: String,
    /// Source file size in bytes
    pub size: u64,
}

/// Delete a file from destination
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeleteAction {
    /// Path relative to the destination root
    pub relpath: String,
}

/// One step reconciling destination with source
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncAction {
    /// Source file is new or changed
    Copy(CopyAction),
    /// Destination file has no source counterpart
    Delete(DeleteAction),
}

impl SyncAction {
    /// Copy action for `relpath`
    pub fn copy(relpath: impl Into<String>, size: u64) -> Self {
        Self::Copy(CopyAction {
            relpath: relpath.into(),
            size,
        })
    }

    /// Delete action for `relpath`
    pub fn delete(relpath: impl Into<String>) -> Self {
        Self::Delete(DeleteAction {
            relpath: relpath.into(),
        })
    }

    /// Path the action applies to
    pub fn relpath(&self) -> &str {
        match self {
            Self::Copy(action) => &action.relpath,
            Self::Delete(action) => &action.relpath,
        }
    }
}

impl std::fmt::Display for SyncAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Copy(action) => write!(f, "copy {} ({} bytes)", action.relpath, action.size),
            Self::Delete(action) => write!(f, "delete {}", action.relpath),
        }
    }
}

/// How a sync treats differences
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Delete destination files missing from source
    pub delete: bool,
    /// Also copy same-size files whose source is newer
    pub mtime_hint: bool,
}

impl SyncOptions {
    /// Options with every behavior off
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable deletion of extra destination files
    pub fn delete(mut self, enable: bool) -> Self {
        self.delete = enable;
        self
    }

    /// Enable the modification time hint
    pub fn mtime_hint(mut self, enable: bool) -> Self {
        self.mtime_hint = enable;
        self
    }
}

/// Lazily computed sync actions, in path order
#[derive(Debug)]
pub struct SyncPlan {
    source: Peekable<vec::IntoIter<DirEntry>>,
    dest: Peekable<vec::IntoIter<DirEntry>>,
    options: SyncOptions,
}

impl SyncPlan {
    fn needs_copy(&self, source: &DirEntry, dest: &DirEntry) -> bool {
        source.size != dest.size || (self.options.mtime_hint && source.mtime > dest.mtime)
    }
}

impl Iterator for SyncPlan {
    type Item = SyncAction;

    fn next(&mut self) -> Option<SyncAction> {
        loop {
            let order = match (self.source.peek(), self.dest.peek()) {
                (None, None) => return None,
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some(source), Some(dest)) => source.relpath.cmp(&dest.relpath),
            };

            match order {
                Ordering::Less => {
                    let source = self.source.next()?;
                    return Some(SyncAction::copy(source.relpath, source.size));
                }
                Ordering::Greater => {
                    let dest = self.dest.next()?;
                    if self.options.delete {
                        return Some(SyncAction::delete(dest.relpath));
                    }
                }
                Ordering::Equal => {
                    let source = self.source.next()?;
                    let dest = self.dest.next()?;
                    if self.needs_copy(&source, &dest) {
                        return Some(SyncAction::copy(source.relpath, source.size));
                    }
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let (source, _) = self.source.size_hint();
        (0, source.checked_add(self.dest.size_hint().0))
    }
}

impl FusedIterator for SyncPlan {}

fn prepare(mut entries: Vec<DirEntry>) -> Vec<DirEntry> {
    entries.retain(|entry| !entry.is_dir);
    entries.sort_unstable_by(|a, b| a.relpath.cmp(&b.relpath));
    entries.dedup_by(|a, b| a.relpath == b.relpath);
    entries
}

/// Merge-join two listings into sync actions.
///
/// The listings may be in any order; directory entries are ignored.
pub fn diff_entries(source: Vec<DirEntry>, dest: Vec<DirEntry>, options: SyncOptions) -> SyncPlan {
    SyncPlan {
        source: prepare(source).into_iter().peekable(),
        dest: prepare(dest).into_iter().peekable(),
        options,
    }
}

/// Compute the actions that bring `dst` in line with `src`.
///
/// A missing source fails with not-found rather than producing an empty
/// plan; a missing destination is treated as empty.
pub async fn sync_iterator(
    src: &StoragePath,
    dst: &StoragePath,
    options: SyncOptions,
) -> Result<SyncPlan> {
    let source_listing = eager(listtree(src), DEFAULT_EAGER_BUFFER).try_collect::<Vec<_>>();
    let dest_listing = eager(listtree(dst), DEFAULT_EAGER_BUFFER).try_collect::<Vec<_>>();
    let (source, dest) = tokio::join!(source_listing, dest_listing);

    let source = source?;
    if source.is_empty() {
        // Only an existing empty directory is a valid empty source
        ensure_directory(src).await?;
    }
    let dest = match dest {
        Ok(dest) => dest,
        Err(err) if err.is_not_found() => Vec::new(),
        Err(err) => return Err(err),
    };

    debug!(
        src = %src,
        dst = %dst,
        source_files = source.len(),
        dest_files = dest.len(),
        "listed trees"
    );
    Ok(diff_entries(source, dest, options))
}
