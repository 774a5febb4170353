//! Memory-mapped file region for persistent data files.

use crate::backend::MappedRegion;
use crate::error::{StorageError, StorageResult};
use fs2::FileExt;
use memmap2::{MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// A memory-mapped file region.
///
/// The whole file is mapped read-write. The file is locked exclusively for
/// the lifetime of the region so that two processes never map the same data
/// file for writing.
///
/// # Durability
///
/// - `flush()` calls `MmapMut::flush()` to write dirty pages back
/// - `sync()` additionally calls `File::sync_all()` for metadata
///
/// # Remapping
///
/// `resize()` extends the file with `set_len` and maps it again. Any slice
/// or address taken before the call is invalid afterwards.
///
/// # Example
///
/// ```no_run
/// use skydb_storage::{MappedRegion, MmapRegion};
/// use std::path::Path;
///
/// let mut region = MmapRegion::open(Path::new("data.sky")).unwrap();
/// region.resize(4096).unwrap();
/// region.as_mut_slice()[0] = 1;
/// region.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct MmapRegion {
    path: PathBuf,
    file: File,
    /// `None` while the file is empty; zero-length maps are rejected by the OS.
    mmap: Option<MmapMut>,
}

impl MmapRegion {
    /// Opens or creates a mapped region backed by the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, locked or mapped.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        FileExt::try_lock_exclusive(&file)
            .map_err(|e| StorageError::Locked(format!("{}: {e}", path.display())))?;

        let len = usize::try_from(file.metadata()?.len()).map_err(|_| {
            StorageError::Corrupted(format!("{} is too large to map", path.display()))
        })?;
        let mmap = map_file(&file, len)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            mmap,
        })
    }

    /// Opens a mapped region, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the file cannot be mapped.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn set_len_and_map(&mut self, len: usize) -> StorageResult<()> {
        self.file.set_len(len as u64)?;
        self.mmap = map_file(&self.file, len)?;
        Ok(())
    }
}

/// Maps `len` bytes of `file`, or nothing when `len` is zero.
#[allow(unsafe_code)]
fn map_file(file: &File, len: usize) -> StorageResult<Option<MmapMut>> {
    if len == 0 {
        return Ok(None);
    }
    // SAFETY: the file is held under an exclusive lock for as long as the
    // map lives, and every access goes through the bounds-checked slices
    // handed out by `MappedRegion`.
    let mmap = unsafe { MmapOptions::new().len(len).map_mut(file)? };
    Ok(Some(mmap))
}

impl MappedRegion for MmapRegion {
    fn len(&self) -> usize {
        self.mmap.as_ref().map_or(0, |m| m.len())
    }

    fn as_slice(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        self.mmap.as_deref_mut().unwrap_or(&mut [])
    }

    fn resize(&mut self, new_len: usize) -> StorageResult<()> {
        if new_len == self.len() {
            return Ok(());
        }

        if let Some(mmap) = &self.mmap {
            mmap.flush()?;
        }
        let old_len = self.len();
        self.mmap = None;

        if let Err(e) = self.set_len_and_map(new_len) {
            // The file keeps its old length unless `set_len` succeeded; map
            // that length again so the region still matches the file
            if self.set_len_and_map(old_len).is_err() {
                self.mmap = None;
            }
            return Err(e);
        }
        Ok(())
    }

    fn flush(&mut self) -> StorageResult<()> {
        if let Some(mmap) = &self.mmap {
            mmap.flush()?;
        }
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.flush()?;
        self.file.sync_all()?;
        Ok(())
    }
}
