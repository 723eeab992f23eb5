//! Error types for BlobSync
//!
//! Distinguishes the conditions callers branch on (not-found, type mismatch)
//! from task failures carrying I/O context and from executor misuse.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for BlobSync operations
#[derive(Error, Debug)]
pub enum BlobSyncError {
    /// Target path is absent
    #[error("Path not found: {0}")]
    NotFound(String),

    /// A file was expected but the path is directory-like
    #[error("Is a directory: {0}")]
    IsADirectory(String),

    /// A directory was expected but the path is a file
    #[error("Not a directory: {0}")]
    NotADirectory(String),

    /// I/O error during a backend primitive
    #[error("I/O error at '{path}': {source}")]
    Io {
        /// Path being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Streamed length disagrees with the declared size
    #[error("Size mismatch writing '{path}': expected {expected} bytes, got {actual} bytes")]
    SizeMismatch {
        /// Destination path
        path: String,
        /// Declared size
        expected: u64,
        /// Bytes actually streamed
        actual: u64,
    },

    /// Concurrency limit must be positive
    #[error("Invalid concurrency limit: {0} (must be at least 1)")]
    InvalidConcurrency(usize),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A background producer panicked or was aborted
    #[error("Background task failed: {0}")]
    Task(String),
}

impl BlobSyncError {
    /// Create an I/O error with path context.
    ///
    /// `NotFound` I/O errors are classified as [`BlobSyncError::NotFound`] so
    /// callers see the same condition regardless of backend.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.display().to_string()),
            _ => Self::Io { path, source },
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Check if this is a not-found condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this is a file/directory type mismatch
    pub fn is_type_mismatch(&self) -> bool {
        matches!(self, Self::IsADirectory(_) | Self::NotADirectory(_))
    }

    /// Get the path associated with this error, if any
    pub fn path(&self) -> Option<String> {
        match self {
            Self::NotFound(path) | Self::IsADirectory(path) | Self::NotADirectory(path) => {
                Some(path.clone())
            }
            Self::SizeMismatch { path, .. } => Some(path.clone()),
            Self::Io { path, .. } => Some(path.display().to_string()),
            _ => None,
        }
    }
}

/// Result type alias for BlobSync operations
pub type Result<T> = std::result::Result<T, BlobSyncError>;

impl From<serde_json::Error> for BlobSyncError {
    fn from(err: serde_json::Error) -> Self {
        BlobSyncError::Config(err.to_string())
    }
}

impl From<tokio::task::JoinError> for BlobSyncError {
    fn from(err: tokio::task::JoinError) -> Self {
        BlobSyncError::Task(err.to_string())
    }
}

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| BlobSyncError::io(path, e))
    }
}
