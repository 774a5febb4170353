//! Path records and the iterators that walk them.
//!
//! After its header, a block holds path records packed back to back in
//! ascending object-id order, followed by zero padding:
//!
//! ```text
//! | object_id (8, BE) | events_len (4, BE) | events_len bytes of packed events |
//! ```
//!
//! Object id 0 is reserved, so a zero id where the next record would start
//! marks the end of the block's records.

use crate::block::Block;
use crate::data_file::DataFile;
use crate::error::{CoreError, CoreResult};
use crate::event::{packed_len, peek_timestamp};
use crate::types::{Generation, ObjectId, Timestamp};

/// Size of a path record header in bytes.
pub const PATH_HEADER_SIZE: usize = 12;

/// Packs a path record header.
#[must_use]
pub fn encode_path_header(object_id: ObjectId, events_len: u32) -> [u8; PATH_HEADER_SIZE] {
    let mut buf = [0u8; PATH_HEADER_SIZE];
    buf[0..8].copy_from_slice(&object_id.to_be_bytes());
    buf[8..12].copy_from_slice(&events_len.to_be_bytes());
    buf
}

/// Reads `(object_id, events_len)` from the front of `buf`, if a full
/// header is present.
#[must_use]
pub fn decode_path_header(buf: &[u8]) -> Option<(ObjectId, u32)> {
    let bytes = buf.get(..PATH_HEADER_SIZE)?;
    let mut id = [0u8; 8];
    id.copy_from_slice(&bytes[0..8]);
    let len = u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
    Some((ObjectId::from_be_bytes(id), len))
}

/// One path record found inside a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathEntry {
    /// Object the path belongs to.
    pub object_id: ObjectId,
    /// Absolute byte offset of the record within the data file.
    pub offset: usize,
    /// Total record length, header included.
    pub len: usize,
}

impl PathEntry {
    /// Length of the packed events that follow the record header.
    #[must_use]
    pub fn events_len(&self) -> usize {
        self.len - PATH_HEADER_SIZE
    }
}

/// Cursor over the path records of one block.
///
/// The iterator borrows the data file's region for its whole lifetime, so
/// the region cannot be remapped while a scan is in progress. Dropping the
/// iterator releases it.
///
/// It can be driven explicitly with [`PathIterator::at_end`],
/// [`PathIterator::current_object_id`] and [`PathIterator::advance`], or
/// consumed as a standard [`Iterator`].
#[derive(Debug)]
pub struct PathIterator<'a> {
    bytes: &'a [u8],
    base: usize,
    generation: Generation,
    pos: usize,
    current: Option<PathEntry>,
    pending: Option<CoreError>,
}

impl<'a> PathIterator<'a> {
    /// Binds an iterator to `block`'s bytes and positions it on the first
    /// record.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Iterator`] if the file is unmapped, the block
    /// is not part of the file, or the first record is malformed.
    pub fn bind(file: &'a DataFile, block: &Block) -> CoreResult<Self> {
        let bind_error =
            |e: CoreError| CoreError::iterator(format!("cannot bind to block {}: {e}", block.index));
        let bytes = file.block_bytes(block.index).map_err(bind_error)?;
        let base = block.offset(file).map_err(bind_error)?;
        Self::over(bytes, base, file.generation())
    }

    /// Builds an iterator over raw block bytes whose first byte sits at
    /// `base` in the data file.
    pub(crate) fn over(bytes: &'a [u8], base: usize, generation: Generation) -> CoreResult<Self> {
        if bytes.len() < crate::header::HEADER_SIZE {
            return Err(CoreError::iterator(format!(
                "block of {} bytes cannot hold a header",
                bytes.len()
            )));
        }
        let mut iter = Self {
            bytes,
            base,
            generation,
            pos: crate::header::HEADER_SIZE,
            current: None,
            pending: None,
        };
        iter.current = iter.read_at(iter.pos)?;
        Ok(iter)
    }

    fn read_at(&self, pos: usize) -> CoreResult<Option<PathEntry>> {
        let Some((object_id, events_len)) = self.bytes.get(pos..).and_then(decode_path_header)
        else {
            return Ok(None);
        };
        if object_id == 0 {
            return Ok(None);
        }

        let len = PATH_HEADER_SIZE + events_len as usize;
        if pos + len > self.bytes.len() {
            return Err(CoreError::iterator(format!(
                "path {object_id} at offset {} overruns its block by {} bytes",
                self.base + pos,
                pos + len - self.bytes.len()
            )));
        }

        Ok(Some(PathEntry {
            object_id,
            offset: self.base + pos,
            len,
        }))
    }

    /// Returns `true` once every record has been visited.
    #[must_use]
    pub fn at_end(&self) -> bool {
        self.current.is_none()
    }

    /// Returns the record under the cursor.
    #[must_use]
    pub fn current(&self) -> Option<PathEntry> {
        self.current
    }

    /// Returns the object id under the cursor, or 0 at the end.
    #[must_use]
    pub fn current_object_id(&self) -> ObjectId {
        self.current.map_or(0, |entry| entry.object_id)
    }

    /// Returns a pointer to the record under the cursor.
    #[must_use]
    pub fn current_pointer(&self) -> Option<PathPointer> {
        self.current.map(|entry| PathPointer {
            object_id: entry.object_id,
            offset: entry.offset,
            len: entry.len,
            generation: self.generation,
        })
    }

    /// Returns the cursor's offset relative to the block start.
    ///
    /// At the end this is the number of bytes the block occupies.
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Moves to the next record. Does nothing at the end.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Iterator`] if the next record is malformed.
    pub fn advance(&mut self) -> CoreResult<()> {
        if let Some(entry) = self.current {
            self.pos += entry.len;
            self.current = self.read_at(self.pos)?;
        }
        Ok(())
    }
}

impl Iterator for PathIterator<'_> {
    type Item = CoreResult<PathEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(e) = self.pending.take() {
            return Some(Err(e));
        }
        let entry = self.current?;
        if let Err(e) = self.advance() {
            // Hand out the good record now and the failure on the next call
            self.current = None;
            self.pending = Some(e);
        }
        Some(Ok(entry))
    }
}

/// A generation-stamped reference to the start of a path record.
///
/// Resolve it with [`DataFile::resolve`]; it is refused after the next
/// structural mutation of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathPointer {
    /// Object the path belongs to.
    pub object_id: ObjectId,
    /// Absolute byte offset of the record.
    pub offset: usize,
    /// Record length, header included.
    pub len: usize,
    /// File generation the pointer was taken at.
    pub generation: Generation,
}

/// A packed event inside a path record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventSlice<'a> {
    /// Offset of the event within the path's event bytes.
    pub offset: usize,
    /// Event timestamp.
    pub timestamp: Timestamp,
    /// The packed event.
    pub bytes: &'a [u8],
}

/// Iterator over the packed events of one path.
#[derive(Debug, Clone)]
pub struct EventIter<'a> {
    events: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> EventIter<'a> {
    /// Creates an iterator over a path's event bytes (header excluded).
    #[must_use]
    pub fn new(events: &'a [u8]) -> Self {
        Self {
            events,
            pos: 0,
            failed: false,
        }
    }
}

impl<'a> Iterator for EventIter<'a> {
    type Item = CoreResult<EventSlice<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.events.len() {
            return None;
        }
        let events = self.events;
        let rest = &events[self.pos..];
        let item = packed_len(rest).and_then(|len| {
            Ok(EventSlice {
                offset: self.pos,
                timestamp: peek_timestamp(rest)?,
                bytes: &rest[..len],
            })
        });
        match item {
            Ok(slice) => {
                self.pos += slice.bytes.len();
                Some(Ok(slice))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Returns the offset within `events` at which an event stamped
/// `timestamp` belongs: after every event with an equal or earlier stamp.
///
/// # Errors
///
/// Returns [`CoreError::Corrupted`] if an existing event cannot be read.
pub fn timestamp_insertion_point(events: &[u8], timestamp: Timestamp) -> CoreResult<usize> {
    for slice in EventIter::new(events) {
        let slice = slice?;
        if slice.timestamp > timestamp {
            return Ok(slice.offset);
        }
    }
    Ok(events.len())
}
