//! Data file manager.
//!
//! A [`DataFile`] owns the mapped region, the fixed block size and the
//! ordered table of [`Block`] descriptors. Reads take `&DataFile` and
//! mutations take `&mut DataFile`, so the borrow checker enforces the
//! single-writer discipline the block layer relies on.

use crate::block::{Block, RegionPointer, SpanBlocks};
use crate::config::DataFileConfig;
use crate::error::{CoreError, CoreResult};
use crate::event::Event;
use crate::header::{BlockHeader, HEADER_SIZE};
use crate::split;
use crate::types::{Generation, ObjectId};
use skydb_storage::{InMemoryRegion, MappedRegion, MmapRegion};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A block-structured, memory-mapped event file.
pub struct DataFile {
    /// `None` while unmapped.
    region: Option<Box<dyn MappedRegion>>,
    block_size: usize,
    blocks: Vec<Block>,
    generation: Generation,
    sync_on_write: bool,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for DataFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataFile")
            .field("path", &self.path)
            .field("block_size", &self.block_size)
            .field("block_count", &self.blocks.len())
            .field("mapped", &self.region.is_some())
            .field("generation", &self.generation)
            .finish()
    }
}

impl DataFile {
    /// Opens (or creates) a memory-mapped data file at `path`.
    ///
    /// A new or empty file is initialised with one empty block.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the file is missing
    /// and `create_if_missing` is off, the file cannot be mapped, or its
    /// length is not a whole number of blocks.
    pub fn open(path: &Path, config: &DataFileConfig) -> CoreResult<Self> {
        config.validate()?;
        if !config.create_if_missing && !path.exists() {
            return Err(CoreError::precondition(format!(
                "data file {} does not exist",
                path.display()
            )));
        }

        let region = MmapRegion::open_with_create_dirs(path)?;
        let mut file = Self::load(Box::new(region), config)?;
        file.path = Some(path.to_path_buf());

        info!(
            path = %path.display(),
            block_size = file.block_size,
            blocks = file.blocks.len(),
            "opened data file"
        );
        Ok(file)
    }

    /// Creates an empty data file held entirely in memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn in_memory(config: &DataFileConfig) -> CoreResult<Self> {
        config.validate()?;
        Self::load(Box::new(InMemoryRegion::new()), config)
    }

    /// Wraps an existing region whose length is a multiple of `block_size`.
    ///
    /// # Errors
    ///
    /// Returns an error if the block size is invalid or the region is not a
    /// whole number of blocks.
    pub fn from_region(region: Box<dyn MappedRegion>, block_size: usize) -> CoreResult<Self> {
        let config = DataFileConfig::new().block_size(block_size);
        config.validate()?;
        Self::load(region, &config)
    }

    /// Builds an unmapped file from a hand-written descriptor table.
    ///
    /// No validation is done, which makes it possible to exercise
    /// addressing and span logic against synthetic layouts, including a
    /// zero block size.
    #[must_use]
    pub fn from_descriptors(block_size: usize, blocks: Vec<Block>) -> Self {
        Self {
            region: None,
            block_size,
            blocks,
            generation: Generation::default(),
            sync_on_write: false,
            path: None,
        }
    }

    fn load(mut region: Box<dyn MappedRegion>, config: &DataFileConfig) -> CoreResult<Self> {
        let block_size = config.block_size;
        if region.is_empty() {
            region.resize(block_size)?;
        }

        let blocks = read_descriptors(region.as_slice(), block_size)?;
        Ok(Self {
            region: Some(region),
            block_size,
            blocks,
            generation: Generation::default(),
            sync_on_write: config.sync_on_write,
            path: None,
        })
    }

    /// Bytes per block.
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of blocks in the file.
    #[must_use]
    pub fn block_count(&self) -> u32 {
        self.blocks.len() as u32
    }

    /// The descriptor table, ordered by index.
    #[must_use]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Returns the descriptor at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Precondition`] if the index is out of range.
    pub fn block(&self, index: u32) -> CoreResult<&Block> {
        self.blocks.get(index as usize).ok_or_else(|| {
            CoreError::precondition(format!(
                "block {index} is out of range for {} blocks",
                self.blocks.len()
            ))
        })
    }

    /// Current structural generation.
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Whether the file currently has a mapped region.
    #[must_use]
    pub fn is_mapped(&self) -> bool {
        self.region.is_some()
    }

    /// Path of the backing file, if it has one.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Base address of the mapped region, if mapped.
    #[must_use]
    pub fn base_address(&self) -> Option<usize> {
        self.region
            .as_ref()
            .map(|region| region.as_slice().as_ptr() as usize)
    }

    fn region(&self) -> CoreResult<&dyn MappedRegion> {
        self.region
            .as_deref()
            .ok_or_else(|| CoreError::precondition("data file must be mapped"))
    }

    fn region_mut(&mut self) -> CoreResult<&mut Box<dyn MappedRegion>> {
        self.region
            .as_mut()
            .ok_or_else(|| CoreError::precondition("data file must be mapped"))
    }

    /// Returns the raw bytes of block `index`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Precondition`] if the file is unmapped or the
    /// index is out of range.
    pub fn block_bytes(&self, index: u32) -> CoreResult<&[u8]> {
        let offset = self.block(index)?.offset(self)?;
        Ok(self.region()?.slice(offset, self.block_size)?)
    }

    pub(crate) fn block_bytes_mut(&mut self, index: u32) -> CoreResult<&mut [u8]> {
        let offset = self.block(index)?.offset(self)?;
        let block_size = self.block_size;
        Ok(self.region_mut()?.slice_mut(offset, block_size)?)
    }

    /// Returns `len` bytes of the region starting at absolute `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unmapped or the range is out of
    /// bounds.
    pub fn region_bytes(&self, offset: usize, len: usize) -> CoreResult<&[u8]> {
        Ok(self.region()?.slice(offset, len)?)
    }

    /// Returns the bytes behind a pointer taken earlier.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Precondition`] if the pointer predates the
    /// current generation or the file is unmapped.
    pub fn resolve<P: RegionPointer>(&self, pointer: &P) -> CoreResult<&[u8]> {
        if pointer.generation() != self.generation {
            return Err(CoreError::precondition(format!(
                "stale pointer from {}, file is at {}",
                pointer.generation(),
                self.generation
            )));
        }
        Ok(self.region()?.slice(pointer.offset(), pointer.len())?)
    }

    /// Invalidates every outstanding pointer.
    pub(crate) fn bump_generation(&mut self) {
        self.generation = self.generation.next();
    }

    /// Replaces the header of block `index`, in the descriptor and on disk.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Precondition`] if the file is unmapped or the
    /// index is out of range.
    pub fn write_header(&mut self, index: u32, header: &BlockHeader) -> CoreResult<()> {
        let bytes = self.block_bytes_mut(index)?;
        header.pack(bytes)?;
        self.blocks[index as usize].apply_header(header);
        Ok(())
    }

    pub(crate) fn set_spanned(&mut self, index: u32, spanned: bool) {
        if let Some(block) = self.blocks.get_mut(index as usize) {
            block.spanned = spanned;
        }
    }

    /// Index of the first block of the span containing `index`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Precondition`] if the index is out of range.
    pub fn span_start(&self, index: u32) -> CoreResult<u32> {
        let block = self.block(index)?;
        if !block.spanned {
            return Ok(index);
        }
        let mut start = index;
        while start > 0 {
            let prev = &self.blocks[start as usize - 1];
            if !prev.spanned || prev.min_object_id != block.min_object_id {
                break;
            }
            start -= 1;
        }
        Ok(start)
    }

    /// Iterates over the blocks of the span that begins at `start`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Precondition`] if the index is out of range.
    pub fn blocks_in_span(&self, start: u32) -> CoreResult<SpanBlocks<'_>> {
        let block = self.block(start)?;
        let iter = SpanBlocks::new(&self.blocks, start, block.min_object_id);
        Ok(if block.spanned {
            iter
        } else {
            SpanBlocks::new(&self.blocks[..=start as usize], start, block.min_object_id)
        })
    }

    /// Inserts `count` empty blocks directly after block `index`.
    ///
    /// The region grows by `count` blocks and every block after `index`
    /// moves up, bytes and descriptors alike, so index order keeps matching
    /// object-id order. Returns the index of the first new block.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unmapped, the index is out of range,
    /// or the region cannot grow.
    pub fn allocate_blocks_after(&mut self, index: u32, count: u32) -> CoreResult<u32> {
        self.block(index)?;
        let block_size = self.block_size;
        let old_len = self.blocks.len() * block_size;
        let shift = count as usize * block_size;
        let first_new = index + 1;
        let move_from = first_new as usize * block_size;

        let region = self.region_mut()?;
        region.resize(old_len + shift)?;
        let bytes = region.as_mut_slice();
        bytes.copy_within(move_from..old_len, move_from + shift);
        bytes[move_from..move_from + shift].fill(0);

        let fresh = (0..count).map(|i| Block::new(first_new + i));
        self.blocks
            .splice(first_new as usize..first_new as usize, fresh);
        for (i, block) in self.blocks.iter_mut().enumerate().skip((first_new + count) as usize) {
            block.index = i as u32;
        }
        self.bump_generation();

        debug!(after = index, count, blocks = self.blocks.len(), "allocated blocks");
        Ok(first_new)
    }

    /// Block that should receive events for `object_id`: the last block whose
    /// range starts at or before it, or block 0.
    #[must_use]
    pub fn target_block(&self, object_id: ObjectId) -> u32 {
        self.blocks
            .iter()
            .rev()
            .find(|b| !b.is_empty() && b.min_object_id <= object_id)
            .map_or(0, |b| b.index)
    }

    /// Adds an event to block `index`, splitting it if it would overflow.
    ///
    /// Returns the index of the block that now holds the event's path.
    ///
    /// # Errors
    ///
    /// See [`split::add_event`].
    pub fn add_event(&mut self, index: u32, event: &Event) -> CoreResult<u32> {
        let target = split::add_event(self, index, event)?;
        if self.sync_on_write {
            self.flush()?;
        }
        Ok(target)
    }

    /// Adds an event to whichever block its object id belongs in.
    ///
    /// # Errors
    ///
    /// See [`split::add_event`].
    pub fn insert_event(&mut self, event: &Event) -> CoreResult<u32> {
        let index = self.target_block(event.object_id);
        self.add_event(index, event)
    }

    /// Writes dirty pages back to the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unmapped or the flush fails.
    pub fn flush(&mut self) -> CoreResult<()> {
        self.region_mut()?.flush()?;
        Ok(())
    }

    /// Flushes and syncs file metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unmapped or the sync fails.
    pub fn sync(&mut self) -> CoreResult<()> {
        self.region_mut()?.sync()?;
        Ok(())
    }

    /// Flushes and releases the mapped region. Descriptors are kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails; the region is released
    /// regardless.
    pub fn unmap(&mut self) -> CoreResult<()> {
        let Some(mut region) = self.region.take() else {
            return Ok(());
        };
        self.bump_generation();
        region.flush()?;
        Ok(())
    }

    /// Attaches a region again after [`DataFile::unmap`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Corrupted`] if the region does not hold exactly
    /// the blocks of the descriptor table.
    pub fn remap(&mut self, region: Box<dyn MappedRegion>) -> CoreResult<()> {
        let expected = self.blocks.len() * self.block_size;
        if region.len() != expected {
            return Err(CoreError::corrupted(format!(
                "region of {} bytes does not match {} blocks of {} bytes",
                region.len(),
                self.blocks.len(),
                self.block_size
            )));
        }
        self.region = Some(region);
        self.bump_generation();
        Ok(())
    }
}

/// Reads one descriptor per block and derives span membership.
fn read_descriptors(bytes: &[u8], block_size: usize) -> CoreResult<Vec<Block>> {
    if bytes.len() % block_size != 0 {
        return Err(CoreError::corrupted(format!(
            "file length {} is not a multiple of block size {block_size}",
            bytes.len()
        )));
    }

    let mut blocks = Vec::with_capacity(bytes.len() / block_size);
    for (index, chunk) in bytes.chunks_exact(block_size).enumerate() {
        let (header, _) = BlockHeader::unpack(&chunk[..HEADER_SIZE])?;
        blocks.push(Block::from_header(index as u32, &header));
    }

    // Neighbours holding the same single object form a span
    let shares_object = |a: &Block, b: &Block| {
        !a.is_empty() && a.min_object_id == a.max_object_id && a.min_object_id == b.min_object_id
    };
    for i in 0..blocks.len() {
        let prev = i.checked_sub(1).map(|p| blocks[p]);
        let next = blocks.get(i + 1).copied();
        let current = blocks[i];
        blocks[i].spanned = prev.is_some_and(|p| shares_object(&current, &p))
            || next.is_some_and(|n| shares_object(&current, &n));
    }

    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::PATH_HEADER_SIZE;
    use tempfile::tempdir;

    fn config() -> DataFileConfig {
        DataFileConfig::new().block_size(128)
    }

    #[test]
    fn in_memory_starts_with_one_empty_block() {
        let file = DataFile::in_memory(&config()).unwrap();
        assert_eq!(file.block_count(), 1);
        assert!(file.block(0).unwrap().is_empty());
        assert!(file.is_mapped());
        assert_eq!(file.block_bytes(0).unwrap().len(), 128);
    }

    #[test]
    fn invalid_block_size_rejected() {
        let result = DataFile::in_memory(&DataFileConfig::new().block_size(16));
        assert!(matches!(result, Err(CoreError::Precondition { .. })));
    }

    #[test]
    fn ragged_region_is_corrupt() {
        let region = InMemoryRegion::zeroed(200);
        let result = DataFile::from_region(Box::new(region), 128);
        assert!(matches!(result, Err(CoreError::Corrupted { .. })));
    }

    #[test]
    fn out_of_range_block_is_precondition_error() {
        let file = DataFile::in_memory(&config()).unwrap();
        assert!(matches!(file.block(3), Err(CoreError::Precondition { .. })));
        assert!(file.block_bytes(3).is_err());
    }

    #[test]
    fn allocation_shifts_following_blocks() {
        let mut file = DataFile::in_memory(&config()).unwrap();
        file.allocate_blocks_after(0, 1).unwrap();
        file.write_header(
            1,
            &BlockHeader {
                min_object_id: 50,
                max_object_id: 60,
                min_timestamp: 1,
                max_timestamp: 2,
            },
        )
        .unwrap();

        let first = file.allocate_blocks_after(0, 2).unwrap();
        assert_eq!(first, 1);
        assert_eq!(file.block_count(), 4);

        let moved = file.block(3).unwrap();
        assert_eq!(moved.index, 3);
        assert_eq!(moved.min_object_id, 50);
        let (on_disk, _) = BlockHeader::unpack(file.block_bytes(3).unwrap()).unwrap();
        assert_eq!(on_disk.max_object_id, 60);

        assert!(file.block(1).unwrap().is_empty());
        assert!(file.block_bytes(2).unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn allocation_bumps_generation_and_stales_pointers() {
        let mut file = DataFile::in_memory(&config()).unwrap();
        let ptr = file.block(0).unwrap().pointer(&file).unwrap();
        assert!(file.resolve(&ptr).is_ok());

        file.allocate_blocks_after(0, 1).unwrap();
        assert!(matches!(
            file.resolve(&ptr),
            Err(CoreError::Precondition { .. })
        ));
    }

    #[test]
    fn unmap_and_remap() {
        let mut file = DataFile::in_memory(&config()).unwrap();
        file.unmap().unwrap();
        assert!(!file.is_mapped());
        assert!(file.base_address().is_none());
        assert!(file.block_bytes(0).is_err());
        // Descriptors survive and offsets still work
        assert_eq!(file.block(0).unwrap().offset(&file).unwrap(), 0);

        assert!(file.remap(Box::new(InMemoryRegion::zeroed(64))).is_err());
        file.remap(Box::new(InMemoryRegion::zeroed(128))).unwrap();
        assert!(file.is_mapped());
    }

    #[test]
    fn spans_derived_on_load() {
        let mut bytes = vec![0u8; 128 * 4];
        let headers = [(1, 3), (7, 7), (7, 7), (9, 9)];
        for (i, (min, max)) in headers.iter().enumerate() {
            let header = BlockHeader {
                min_object_id: *min,
                max_object_id: *max,
                min_timestamp: 0,
                max_timestamp: 0,
            };
            header.pack(&mut bytes[i * 128..]).unwrap();
        }

        let file = DataFile::from_region(Box::new(InMemoryRegion::with_data(bytes)), 128).unwrap();
        let spanned: Vec<bool> = file.blocks().iter().map(|b| b.spanned).collect();
        assert_eq!(spanned, vec![false, true, true, false]);
        assert_eq!(file.span_start(2).unwrap(), 1);
        assert_eq!(file.blocks_in_span(1).unwrap().count(), 2);
        assert_eq!(file.blocks_in_span(3).unwrap().count(), 1);
    }

    #[test]
    fn target_block_follows_ranges() {
        let blocks = vec![
            Block::from_header(0, &BlockHeader { min_object_id: 1, max_object_id: 5, ..Default::default() }),
            Block::from_header(1, &BlockHeader { min_object_id: 10, max_object_id: 20, ..Default::default() }),
        ];
        let file = DataFile::from_descriptors(128, blocks);
        assert_eq!(file.target_block(0), 0);
        assert_eq!(file.target_block(3), 0);
        assert_eq!(file.target_block(7), 0);
        assert_eq!(file.target_block(10), 1);
        assert_eq!(file.target_block(99), 1);
    }

    #[test]
    fn reopen_mapped_file_restores_descriptors() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.sky");
        let cfg = DataFileConfig::new().block_size(64);

        {
            let mut file = DataFile::open(&path, &cfg).unwrap();
            for id in 1..=6 {
                file.insert_event(&Event::new(id, id as i64 * 10)).unwrap();
            }
            file.sync().unwrap();
        }

        let file = DataFile::open(&path, &cfg).unwrap();
        assert!(file.block_count() > 1);
        let ids: Vec<ObjectId> = file
            .blocks()
            .iter()
            .flat_map(|b| b.paths(&file).unwrap().map(|e| e.unwrap().object_id))
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5, 6]);
        for b in file.blocks() {
            assert!(b.used_size(&file).unwrap() <= 64);
            assert!(b.used_size(&file).unwrap() >= HEADER_SIZE + PATH_HEADER_SIZE);
        }
    }

    #[test]
    fn open_missing_without_create_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.sky");
        let cfg = DataFileConfig::new().create_if_missing(false);
        assert!(matches!(
            DataFile::open(&path, &cfg),
            Err(CoreError::Precondition { .. })
        ));
    }
}
