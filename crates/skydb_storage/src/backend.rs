//! Mapped region trait definition.

use crate::error::{StorageError, StorageResult};

/// A contiguous, randomly writable byte region.
///
/// Regions are **opaque byte buffers**. They do not know about blocks,
/// headers or paths; the block layer in `skydb_core` owns all format
/// interpretation and only asks a region for its bytes.
///
/// # Invariants
///
/// - `as_slice().len() == len()` at all times
/// - `resize` preserves the existing prefix and zero-fills new bytes
/// - Any slice borrowed from the region is invalidated by `resize`
///
/// # Implementors
///
/// - [`super::InMemoryRegion`] - For testing and ephemeral files
/// - [`super::MmapRegion`] - For memory-mapped data files
pub trait MappedRegion: Send + Sync {
    /// Returns the current length of the region in bytes.
    fn len(&self) -> usize;

    /// Returns `true` if the region holds no bytes.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the whole region as a byte slice.
    fn as_slice(&self) -> &[u8];

    /// Returns the whole region as a mutable byte slice.
    fn as_mut_slice(&mut self) -> &mut [u8];

    /// Grows or shrinks the region to `new_len` bytes.
    ///
    /// New bytes are zero-filled. For mapped files this remaps the file,
    /// so the base address may change.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be resized.
    fn resize(&mut self, new_len: usize) -> StorageResult<()>;

    /// Pushes dirty bytes towards durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush operation fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Flushes and also syncs file metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Returns `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::OutOfBounds`] if the range leaves the region.
    fn slice(&self, offset: usize, len: usize) -> StorageResult<&[u8]> {
        let size = self.len();
        match offset.checked_add(len) {
            Some(end) if end <= size => Ok(&self.as_slice()[offset..end]),
            _ => Err(StorageError::OutOfBounds {
                offset: offset as u64,
                len,
                size: size as u64,
            }),
        }
    }

    /// Returns `len` mutable bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::OutOfBounds`] if the range leaves the region.
    fn slice_mut(&mut self, offset: usize, len: usize) -> StorageResult<&mut [u8]> {
        let size = self.len();
        match offset.checked_add(len) {
            Some(end) if end <= size => Ok(&mut self.as_mut_slice()[offset..end]),
            _ => Err(StorageError::OutOfBounds {
                offset: offset as u64,
                len,
                size: size as u64,
            }),
        }
    }
}
