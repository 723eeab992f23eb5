//! Tree synchronization
//!
//! Provides one-way sync between any two storage roots:
//! - Size-based change detection (mtime optionally used as a hint)
//! - Lazy, path-ordered action plans
//! - Concurrent, fail-fast plan application on a shared executor

mod diff;
mod driver;

pub use diff::*;
pub use driver::{sync, sync_all, SyncSummary};
