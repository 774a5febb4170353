//! In-memory region for testing.

use crate::backend::MappedRegion;
use crate::error::StorageResult;

/// An in-memory byte region.
///
/// This region keeps all bytes in a `Vec` and is suitable for:
/// - Unit tests
/// - Synthetic data files built by hand
/// - Ephemeral stores that don't need persistence
///
/// # Example
///
/// ```rust
/// use skydb_storage::{MappedRegion, InMemoryRegion};
///
/// let mut region = InMemoryRegion::new();
/// region.resize(16).unwrap();
/// region.as_mut_slice()[0] = 7;
/// assert_eq!(region.slice(0, 2).unwrap(), &[7, 0]);
/// ```
#[derive(Debug, Default, Clone)]
pub struct InMemoryRegion {
    data: Vec<u8>,
}

impl InMemoryRegion {
    /// Creates a new empty region.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a zero-filled region of `len` bytes.
    #[must_use]
    pub fn zeroed(len: usize) -> Self {
        Self { data: vec![0; len] }
    }

    /// Creates a region with pre-existing bytes.
    ///
    /// Useful for testing reload scenarios.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Returns a copy of all bytes in the region.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.data.clone()
    }
}

impl MappedRegion for InMemoryRegion {
    fn len(&self) -> usize {
        self.data.len()
    }

    fn as_slice(&self) -> &[u8] {
        &self.data
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn resize(&mut self, new_len: usize) -> StorageResult<()> {
        self.data.resize(new_len, 0);
        Ok(())
    }

    fn flush(&mut self) -> StorageResult<()> {
        // Nothing is pending
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StorageError;

    #[test]
    fn memory_new_is_empty() {
        let region = InMemoryRegion::new();
        assert_eq!(region.len(), 0);
        assert!(region.is_empty());
    }

    #[test]
    fn memory_zeroed_has_length() {
        let region = InMemoryRegion::zeroed(64);
        assert_eq!(region.len(), 64);
        assert!(region.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn memory_resize_preserves_prefix() {
        let mut region = InMemoryRegion::with_data(b"hello".to_vec());
        region.resize(8).unwrap();
        assert_eq!(region.as_slice(), b"hello\0\0\0");

        region.resize(2).unwrap();
        assert_eq!(region.as_slice(), b"he");
    }

    #[test]
    fn memory_slice_within_bounds() {
        let region = InMemoryRegion::with_data(b"hello world".to_vec());
        assert_eq!(region.slice(6, 5).unwrap(), b"world");
        assert!(region.slice(11, 0).unwrap().is_empty());
    }

    #[test]
    fn memory_slice_past_end_fails() {
        let region = InMemoryRegion::with_data(b"hello".to_vec());
        let result = region.slice(3, 10);
        assert!(matches!(result, Err(StorageError::OutOfBounds { .. })));

        let result = region.slice(usize::MAX, 2);
        assert!(matches!(result, Err(StorageError::OutOfBounds { .. })));
    }

    #[test]
    fn memory_slice_mut_writes_through() {
        let mut region = InMemoryRegion::zeroed(4);
        region.slice_mut(1, 2).unwrap().copy_from_slice(&[9, 8]);
        assert_eq!(region.data(), vec![0, 9, 8, 0]);
    }

    #[test]
    fn memory_flush_and_sync_succeed() {
        let mut region = InMemoryRegion::zeroed(4);
        assert!(region.flush().is_ok());
        assert!(region.sync().is_ok());
    }
}
