//! Error types for the SkyDB block layer.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in SkyDB block operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Mapped region error.
    #[error("storage error: {0}")]
    Storage(#[from] skydb_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A structural requirement was not met (zero block size, unmapped
    /// file, unknown block index, stale pointer, reserved object id).
    #[error("precondition failed: {message}")]
    Precondition {
        /// Description of the unmet requirement.
        message: String,
    },

    /// An argument was unusable, such as a buffer too short for a header.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the bad argument.
        message: String,
    },

    /// The path iterator could not bind to a block or read a record.
    #[error("path iterator error: {message}")]
    Iterator {
        /// Description of the iterator failure.
        message: String,
    },

    /// No layout of blocks can hold the requested insertion.
    #[error("capacity exceeded: {required} bytes required, {available} available")]
    Capacity {
        /// Bytes the insertion needs.
        required: usize,
        /// Bytes a single block can offer.
        available: usize,
    },

    /// On-disk bytes could not be decoded.
    #[error("data file corruption: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },
}

impl CoreError {
    /// Creates a precondition error.
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a path iterator error.
    pub fn iterator(message: impl Into<String>) -> Self {
        Self::Iterator {
            message: message.into(),
        }
    }

    /// Creates a capacity error.
    pub fn capacity(required: usize, available: usize) -> Self {
        Self::Capacity {
            required,
            available,
        }
    }

    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_message_names_both_sizes() {
        let err = CoreError::capacity(300, 224);
        assert_eq!(
            err.to_string(),
            "capacity exceeded: 300 bytes required, 224 available"
        );
    }

    #[test]
    fn storage_errors_convert() {
        let err: CoreError = skydb_storage::StorageError::Corrupted("bad".into()).into();
        assert!(matches!(err, CoreError::Storage(_)));
    }
}
