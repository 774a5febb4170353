//! Block descriptors: addressing, spans and path lookup.
//!
//! A [`Block`] is a plain descriptor. It never points back at its data
//! file; every operation that needs the file takes it as an argument, so
//! the same descriptor logic works against mapped files and hand-built
//! descriptor tables alike.

use crate::data_file::DataFile;
use crate::error::{CoreError, CoreResult};
use crate::header::BlockHeader;
use crate::path::{PathIterator, PathPointer};
use crate::types::{Generation, ObjectId, Timestamp};

/// Descriptor for one fixed-size block of a data file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Block {
    /// Position in the data file's block array; also the physical slot.
    pub index: u32,
    /// Smallest object id stored in the block (or its span).
    pub min_object_id: ObjectId,
    /// Largest object id stored in the block.
    pub max_object_id: ObjectId,
    /// Earliest event timestamp in the block.
    pub min_timestamp: Timestamp,
    /// Latest event timestamp in the block.
    pub max_timestamp: Timestamp,
    /// Whether the block is part of a multi-block run for one object.
    pub spanned: bool,
}

impl Block {
    /// Creates an empty descriptor for slot `index`.
    #[must_use]
    pub fn new(index: u32) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    /// Creates a descriptor for slot `index` from an unpacked header.
    #[must_use]
    pub fn from_header(index: u32, header: &BlockHeader) -> Self {
        let mut block = Self::new(index);
        block.apply_header(header);
        block
    }

    /// Returns the header fields of this block.
    #[must_use]
    pub fn header(&self) -> BlockHeader {
        BlockHeader {
            min_object_id: self.min_object_id,
            max_object_id: self.max_object_id,
            min_timestamp: self.min_timestamp,
            max_timestamp: self.max_timestamp,
        }
    }

    /// Overwrites the header fields of this block.
    pub fn apply_header(&mut self, header: &BlockHeader) {
        self.min_object_id = header.min_object_id;
        self.max_object_id = header.max_object_id;
        self.min_timestamp = header.min_timestamp;
        self.max_timestamp = header.max_timestamp;
    }

    /// Returns `true` if no path has been stored in the block.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.header().is_empty()
    }

    /// Packs this block's header into `buf`. See [`BlockHeader::pack`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] if `buf` is too short.
    pub fn pack(&self, buf: &mut [u8]) -> CoreResult<usize> {
        self.header().pack(buf)
    }

    /// Unpacks a header from `buf` into this block. See [`BlockHeader::unpack`].
    ///
    /// The descriptor is left untouched on failure.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] if `buf` is too short.
    pub fn unpack(&mut self, buf: &[u8]) -> CoreResult<usize> {
        let (header, read) = BlockHeader::unpack(buf)?;
        self.apply_header(&header);
        Ok(read)
    }

    /// Byte offset of this block within the data file.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Precondition`] if the file's block size is zero
    /// or the offset does not fit in `usize`.
    pub fn offset(&self, file: &DataFile) -> CoreResult<usize> {
        let block_size = file.block_size();
        if block_size == 0 {
            return Err(CoreError::precondition(
                "data file must have a nonzero block size",
            ));
        }
        block_size.checked_mul(self.index as usize).ok_or_else(|| {
            CoreError::precondition(format!("offset of block {} overflows", self.index))
        })
    }

    /// Pointer to the start of this block inside the mapped region.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Precondition`] if the file is unmapped or the
    /// offset cannot be computed.
    pub fn pointer(&self, file: &DataFile) -> CoreResult<BlockPointer> {
        let Some(base) = file.base_address() else {
            return Err(CoreError::precondition("data file must be mapped"));
        };
        let offset = self.offset(file)?;

        Ok(BlockPointer {
            index: self.index,
            offset,
            len: file.block_size(),
            addr: base + offset,
            generation: file.generation(),
        })
    }

    /// Number of consecutive blocks this block's object occupies.
    ///
    /// Must be called on the first block of a span; on any later block the
    /// count is meaningless. Non-spanned blocks answer 1 without scanning.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Precondition`] if the block is not in the file.
    pub fn span_count(&self, file: &DataFile) -> CoreResult<u32> {
        if file.blocks().get(self.index as usize).is_none() {
            return Err(CoreError::precondition(format!(
                "block {} is not in a file of {} blocks",
                self.index,
                file.block_count()
            )));
        }
        if !self.spanned {
            return Ok(1);
        }

        let count = SpanBlocks::new(file.blocks(), self.index, self.min_object_id).count();
        Ok(count as u32)
    }

    /// Finds the start of `object_id`'s path record in this block.
    ///
    /// Returns `Ok(None)` if the block holds no path for the object.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Precondition`] for object id 0 and
    /// [`CoreError::Iterator`] if the block cannot be scanned.
    pub fn locate_path(&self, file: &DataFile, object_id: ObjectId) -> CoreResult<Option<PathPointer>> {
        if object_id == 0 {
            return Err(CoreError::precondition("object id 0 is reserved"));
        }

        let mut iter = PathIterator::bind(file, self)?;
        while !iter.at_end() {
            if iter.current_object_id() == object_id {
                return Ok(iter.current_pointer());
            }
            iter.advance()?;
        }
        Ok(None)
    }

    /// Bytes occupied by the header and path records.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Iterator`] if the block cannot be scanned.
    pub fn used_size(&self, file: &DataFile) -> CoreResult<usize> {
        let mut iter = PathIterator::bind(file, self)?;
        while !iter.at_end() {
            iter.advance()?;
        }
        Ok(iter.position())
    }

    /// Iterates over the path records of this block.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Iterator`] if the iterator cannot be bound.
    pub fn paths<'a>(&self, file: &'a DataFile) -> CoreResult<PathIterator<'a>> {
        PathIterator::bind(file, self)
    }
}

/// A generation-stamped view of one block inside the mapped region.
///
/// Resolve it with [`DataFile::resolve`]; it is refused once the file has
/// been mutated or remapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockPointer {
    /// Block the pointer refers to.
    pub index: u32,
    /// Byte offset of the block.
    pub offset: usize,
    /// Block length in bytes.
    pub len: usize,
    /// Raw address of the block start at the time the pointer was taken.
    /// Informational only; never dereferenced.
    pub addr: usize,
    /// File generation the pointer was taken at.
    pub generation: Generation,
}

/// A byte range inside a data file that is only valid for one generation.
pub trait RegionPointer {
    /// Absolute byte offset.
    fn offset(&self) -> usize;
    /// Length in bytes.
    fn len(&self) -> usize;
    /// Generation the pointer was taken at.
    fn generation(&self) -> Generation;
}

impl RegionPointer for BlockPointer {
    fn offset(&self) -> usize {
        self.offset
    }
    fn len(&self) -> usize {
        self.len
    }
    fn generation(&self) -> Generation {
        self.generation
    }
}

impl RegionPointer for PathPointer {
    fn offset(&self) -> usize {
        self.offset
    }
    fn len(&self) -> usize {
        self.len
    }
    fn generation(&self) -> Generation {
        self.generation
    }
}

/// Iterator over the run of consecutive blocks sharing a `min_object_id`.
///
/// Starts at the given block and stops at the first block whose
/// `min_object_id` differs, or at the end of the table.
#[derive(Debug, Clone)]
pub struct SpanBlocks<'a> {
    blocks: &'a [Block],
    next: usize,
    object_id: ObjectId,
}

impl<'a> SpanBlocks<'a> {
    /// Creates a traversal starting at `start`.
    #[must_use]
    pub fn new(blocks: &'a [Block], start: u32, object_id: ObjectId) -> Self {
        Self {
            blocks,
            next: start as usize,
            object_id,
        }
    }
}

impl<'a> Iterator for SpanBlocks<'a> {
    type Item = &'a Block;

    fn next(&mut self) -> Option<Self::Item> {
        let blocks = self.blocks;
        let block = blocks.get(self.next)?;
        if block.min_object_id != self.object_id {
            return None;
        }
        self.next += 1;
        Some(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DataFileConfig;
    use crate::event::Event;
    use crate::header::HEADER_SIZE;
    use crate::path::PATH_HEADER_SIZE;

    fn block(index: u32, min: ObjectId, max: ObjectId, spanned: bool) -> Block {
        Block {
            index,
            min_object_id: min,
            max_object_id: max,
            min_timestamp: 0,
            max_timestamp: 0,
            spanned,
        }
    }

    fn small_file() -> DataFile {
        DataFile::in_memory(&DataFileConfig::new().block_size(256)).unwrap()
    }

    #[test]
    fn pack_unpack_through_descriptor() {
        let mut original = Block::new(3);
        original.min_object_id = 10;
        original.max_object_id = 20;
        original.min_timestamp = -5;
        original.max_timestamp = 99;

        let mut buf = [0u8; HEADER_SIZE];
        assert_eq!(original.pack(&mut buf).unwrap(), HEADER_SIZE);

        let mut restored = Block::new(3);
        assert_eq!(restored.unpack(&buf).unwrap(), HEADER_SIZE);
        assert_eq!(restored, original);
    }

    #[test]
    fn failed_unpack_leaves_descriptor_alone() {
        let mut b = block(0, 7, 8, false);
        assert!(b.unpack(&[0u8; 10]).is_err());
        assert_eq!(b.min_object_id, 7);
        assert_eq!(b.max_object_id, 8);
    }

    #[test]
    fn offset_is_block_size_times_index() {
        let blocks = (0..4).map(|i| block(i, 0, 0, false)).collect();
        let file = DataFile::from_descriptors(128, blocks);

        for b in file.blocks() {
            assert_eq!(b.offset(&file).unwrap(), 128 * b.index as usize);
        }
    }

    #[test]
    fn offset_requires_nonzero_block_size() {
        let file = DataFile::from_descriptors(0, vec![block(0, 0, 0, false)]);
        let result = file.blocks()[0].offset(&file);
        assert!(matches!(result, Err(CoreError::Precondition { .. })));
    }

    #[test]
    fn pointer_requires_mapping() {
        let file = DataFile::from_descriptors(128, vec![block(0, 0, 0, false)]);
        let result = file.blocks()[0].pointer(&file);
        assert!(matches!(result, Err(CoreError::Precondition { .. })));
    }

    #[test]
    fn pointer_resolves_to_block_bytes() {
        let mut file = small_file();
        file.allocate_blocks_after(0, 1).unwrap();

        let b = *file.block(1).unwrap();
        let ptr = b.pointer(&file).unwrap();
        assert_eq!(ptr.offset, 256);
        assert_eq!(ptr.len, 256);
        assert_eq!(ptr.addr, file.base_address().unwrap() + 256);
        assert_eq!(file.resolve(&ptr).unwrap().len(), 256);
    }

    #[test]
    fn span_count_for_unspanned_block_is_one() {
        // Neighbours share the id, but the flag says no span: no scan happens
        let blocks = vec![block(0, 5, 5, false), block(1, 5, 5, false)];
        let file = DataFile::from_descriptors(128, blocks);
        assert_eq!(file.blocks()[0].span_count(&file).unwrap(), 1);
    }

    #[test]
    fn span_count_scans_matching_run() {
        let blocks = vec![
            block(0, 1, 3, false),
            block(1, 7, 7, true),
            block(2, 7, 7, true),
            block(3, 7, 7, true),
            block(4, 9, 12, false),
        ];
        let file = DataFile::from_descriptors(128, blocks);
        assert_eq!(file.blocks()[1].span_count(&file).unwrap(), 3);
    }

    #[test]
    fn span_count_stops_at_end_of_table() {
        let blocks = vec![block(0, 1, 1, false), block(1, 4, 4, true), block(2, 4, 4, true)];
        let file = DataFile::from_descriptors(128, blocks);
        assert_eq!(file.blocks()[1].span_count(&file).unwrap(), 2);
    }

    #[test]
    fn span_count_rejects_foreign_block() {
        let file = DataFile::from_descriptors(128, vec![block(0, 1, 1, false)]);
        let stranger = block(5, 1, 1, true);
        assert!(matches!(
            stranger.span_count(&file),
            Err(CoreError::Precondition { .. })
        ));
    }

    #[test]
    fn locate_path_finds_record_start() {
        let mut file = small_file();
        for id in [20, 5, 9] {
            file.add_event(0, &Event::new(id, 100)).unwrap();
        }

        let b = *file.block(0).unwrap();
        let ptr = b.locate_path(&file, 9).unwrap().unwrap();
        assert_eq!(ptr.object_id, 9);
        // Records are 12 + 9 bytes each, ordered 5, 9, 20
        assert_eq!(ptr.offset, HEADER_SIZE + PATH_HEADER_SIZE + 9);

        let bytes = file.resolve(&ptr).unwrap();
        assert_eq!(&bytes[..8], &9u64.to_be_bytes());

        assert!(b.locate_path(&file, 7).unwrap().is_none());
    }

    #[test]
    fn locate_path_rejects_reserved_id() {
        let file = small_file();
        let b = *file.block(0).unwrap();
        assert!(matches!(
            b.locate_path(&file, 0),
            Err(CoreError::Precondition { .. })
        ));
    }

    #[test]
    fn locate_path_on_unmapped_file_is_iterator_error() {
        let file = DataFile::from_descriptors(128, vec![block(0, 1, 1, false)]);
        assert!(matches!(
            file.blocks()[0].locate_path(&file, 1),
            Err(CoreError::Iterator { .. })
        ));
    }

    #[test]
    fn used_size_counts_header_and_records() {
        let mut file = small_file();
        let b = *file.block(0).unwrap();
        assert_eq!(b.used_size(&file).unwrap(), HEADER_SIZE);

        file.add_event(0, &Event::new(3, 1)).unwrap();
        file.add_event(0, &Event::new(3, 2)).unwrap();
        let b = *file.block(0).unwrap();
        assert_eq!(b.used_size(&file).unwrap(), HEADER_SIZE + PATH_HEADER_SIZE + 18);
    }

    #[test]
    fn span_blocks_yields_run() {
        let blocks = vec![block(0, 2, 2, true), block(1, 2, 2, true), block(2, 3, 3, false)];
        let ids: Vec<u32> = SpanBlocks::new(&blocks, 0, 2).map(|b| b.index).collect();
        assert_eq!(ids, vec![0, 1]);
        assert_eq!(SpanBlocks::new(&blocks, 2, 3).count(), 1);
        assert_eq!(SpanBlocks::new(&blocks, 3, 3).count(), 0);
    }
}
