//! Error types for mapped region operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while mapping or resizing a region.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to access bytes beyond the end of the region.
    #[error("access beyond end of region: offset {offset}, len {len}, size {size}")]
    OutOfBounds {
        /// The requested offset.
        offset: u64,
        /// The requested length.
        len: usize,
        /// The current region size.
        size: u64,
    },

    /// The backing file is corrupted or has an unexpected shape.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// Another process holds the backing file.
    #[error("file is locked by another process: {0}")]
    Locked(String),
}
