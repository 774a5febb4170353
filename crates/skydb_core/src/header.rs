//! Fixed 32-byte block header codec.
//!
//! Every block starts with its object-id range followed by its timestamp
//! range, each field an 8-byte big-endian integer:
//!
//! ```text
//! | 0..8 min_object_id | 8..16 max_object_id | 16..24 min_timestamp | 24..32 max_timestamp |
//! ```
//!
//! Only the header needs byte-order conversion; path records are read in
//! place from the mapped region.

use crate::error::{CoreError, CoreResult};
use crate::types::{ObjectId, Timestamp};

/// Size of a packed block header in bytes.
pub const HEADER_SIZE: usize = 32;

/// Object-id and timestamp range covered by one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct BlockHeader {
    /// Smallest object id stored in the block.
    pub min_object_id: ObjectId,
    /// Largest object id stored in the block.
    pub max_object_id: ObjectId,
    /// Earliest event timestamp stored in the block.
    pub min_timestamp: Timestamp,
    /// Latest event timestamp stored in the block.
    pub max_timestamp: Timestamp,
}

impl BlockHeader {
    /// Returns `true` for the all-zero header of a block with no paths.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.min_object_id == 0 && self.max_object_id == 0
    }

    /// Packs the header into the front of `buf`.
    ///
    /// Returns the number of bytes written, always [`HEADER_SIZE`].
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] if `buf` is shorter than
    /// [`HEADER_SIZE`]. Nothing is written in that case.
    pub fn pack(&self, buf: &mut [u8]) -> CoreResult<usize> {
        let Some(out) = buf.get_mut(..HEADER_SIZE) else {
            return Err(CoreError::invalid_argument(format!(
                "header needs {HEADER_SIZE} bytes, buffer has {}",
                buf.len()
            )));
        };

        out.copy_from_slice(&self.to_bytes());
        Ok(HEADER_SIZE)
    }

    /// Unpacks a header from the front of `buf`.
    ///
    /// Returns the header and the number of bytes read.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] if `buf` is shorter than
    /// [`HEADER_SIZE`].
    pub fn unpack(buf: &[u8]) -> CoreResult<(Self, usize)> {
        let Some(input) = buf.get(..HEADER_SIZE) else {
            return Err(CoreError::invalid_argument(format!(
                "header needs {HEADER_SIZE} bytes, buffer has {}",
                buf.len()
            )));
        };

        let header = Self {
            min_object_id: u64::from_be_bytes(field(input, 0)),
            max_object_id: u64::from_be_bytes(field(input, 8)),
            min_timestamp: i64::from_be_bytes(field(input, 16)),
            max_timestamp: i64::from_be_bytes(field(input, 24)),
        };

        Ok((header, HEADER_SIZE))
    }

    /// Packs the header into a fresh array.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..8].copy_from_slice(&self.min_object_id.to_be_bytes());
        buf[8..16].copy_from_slice(&self.max_object_id.to_be_bytes());
        buf[16..24].copy_from_slice(&self.min_timestamp.to_be_bytes());
        buf[24..32].copy_from_slice(&self.max_timestamp.to_be_bytes());
        buf
    }

    /// Widens the ranges to include one more event.
    ///
    /// An empty header is replaced by the event's own ranges.
    pub fn include(&mut self, object_id: ObjectId, timestamp: Timestamp) {
        if self.is_empty() {
            *self = Self {
                min_object_id: object_id,
                max_object_id: object_id,
                min_timestamp: timestamp,
                max_timestamp: timestamp,
            };
            return;
        }
        self.min_object_id = self.min_object_id.min(object_id);
        self.max_object_id = self.max_object_id.max(object_id);
        self.min_timestamp = self.min_timestamp.min(timestamp);
        self.max_timestamp = self.max_timestamp.max(timestamp);
    }
}

fn field(input: &[u8], at: usize) -> [u8; 8] {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&input[at..at + 8]);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BlockHeader {
        BlockHeader {
            min_object_id: 3,
            max_object_id: 0x0102_0304_0506_0708,
            min_timestamp: -1,
            max_timestamp: 1_000_000,
        }
    }

    #[test]
    fn pack_writes_big_endian_fields_in_order() {
        let mut buf = [0xFFu8; 40];
        let written = sample().pack(&mut buf).unwrap();
        assert_eq!(written, HEADER_SIZE);

        assert_eq!(&buf[0..8], &[0, 0, 0, 0, 0, 0, 0, 3]);
        assert_eq!(&buf[8..16], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(&buf[16..24], &[0xFF; 8]);
        assert_eq!(&buf[24..32], &[0, 0, 0, 0, 0, 0x0F, 0x42, 0x40]);
        // Bytes past the header are untouched
        assert_eq!(&buf[32..], &[0xFF; 8]);
    }

    #[test]
    fn unpack_reverses_pack() {
        let mut buf = [0u8; HEADER_SIZE];
        sample().pack(&mut buf).unwrap();

        let (header, read) = BlockHeader::unpack(&buf).unwrap();
        assert_eq!(read, HEADER_SIZE);
        assert_eq!(header, sample());
    }

    #[test]
    fn pack_short_buffer_fails_without_writing() {
        let mut buf = [0xAAu8; 31];
        let result = sample().pack(&mut buf);
        assert!(matches!(result, Err(CoreError::InvalidArgument { .. })));
        assert!(buf.iter().all(|&b| b == 0xAA));
    }

    #[test]
    fn unpack_short_buffer_fails() {
        let result = BlockHeader::unpack(&[0u8; 16]);
        assert!(matches!(result, Err(CoreError::InvalidArgument { .. })));
    }

    #[test]
    fn packing_twice_is_identical() {
        let header = sample();
        let mut first = [0u8; HEADER_SIZE];
        let mut second = [0u8; HEADER_SIZE];
        header.pack(&mut first).unwrap();
        header.pack(&mut second).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, header.to_bytes());
    }

    #[test]
    fn include_replaces_empty_and_widens_otherwise() {
        let mut header = BlockHeader::default();
        assert!(header.is_empty());

        header.include(10, 500);
        assert_eq!(header.min_object_id, 10);
        assert_eq!(header.max_object_id, 10);
        assert_eq!(header.min_timestamp, 500);
        assert_eq!(header.max_timestamp, 500);

        header.include(4, 900);
        header.include(12, -20);
        assert_eq!(header.min_object_id, 4);
        assert_eq!(header.max_object_id, 12);
        assert_eq!(header.min_timestamp, -20);
        assert_eq!(header.max_timestamp, 900);
    }
}
