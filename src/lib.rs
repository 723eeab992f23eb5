//! # BlobSync - Bulk Data Movement for Object Stores
//!
//! BlobSync moves many files between storage backends with high latency per
//! request by keeping a bounded number of requests in flight at once.
//!
//! ## Features
//!
//! - **Boost Executor**: Bounded-concurrency ordered and unordered mapping
//!   over streams, with one slot budget shared by every call
//! - **Eager Streams**: Start slow listings ahead of their consumer
//! - **Tree Sync**: Size-based diff of two trees and concurrent application
//! - **Tree Removal**: Concurrent recursive delete
//! - **Parallel Reads**: Large files fetched as concurrent byte ranges
//!
//! ## Quick Start
//!
//! ```no_run
//! use blobsync::prelude::*;
//!
//! # async fn run() -> blobsync::Result<()> {
//! let executor = BoostExecutor::new(32)?;
//! let src = StoragePath::local("/data/source");
//! let dst = StoragePath::local("/data/mirror");
//!
//! let summary = sync_all(&src, &dst, &executor, SyncOptions::new().delete(true)).await?;
//! println!("{}", summary);
//! # Ok(())
//! # }
//! ```
//!
//! ## Mapping
//!
//! ```no_run
//! use blobsync::BoostExecutor;
//! use futures::{stream, TryStreamExt};
//!
//! # async fn run() -> blobsync::Result<()> {
//! let executor = BoostExecutor::new(8)?;
//! let squares: Vec<u64> = executor
//!     .map_ordered(|n: u64| async move { Ok::<_, blobsync::BlobSyncError>(n * n) }, stream::iter(0..100))
//!     .try_collect()
//!     .await?;
//! assert_eq!(squares[9], 81);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod boost;
pub mod config;
pub mod error;
pub mod storage;
pub mod sync;

// Re-export commonly used types
pub use boost::{consume, eager, BoostExecutor, EagerStream, OrderedBoost, UnorderedBoost};
pub use config::BoostConfig;
pub use error::{BlobSyncError, Result};
pub use storage::{rmtree, rmtree_iterator, DirEntry, MemoryStore, StoragePath};
pub use sync::{
    diff_entries, sync, sync_all, sync_iterator, CopyAction, DeleteAction, SyncAction,
    SyncOptions, SyncPlan, SyncSummary,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use blobsync::prelude::*;
    //! ```

    pub use crate::boost::{consume, eager, BoostExecutor};
    pub use crate::config::BoostConfig;
    pub use crate::error::{BlobSyncError, Result};
    pub use crate::storage::{rmtree, rmtree_iterator, DirEntry, MemoryStore, StoragePath};
    pub use crate::sync::{sync, sync_all, sync_iterator, SyncAction, SyncOptions, SyncSummary};
}
