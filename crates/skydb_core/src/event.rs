//! Packed event codec.
//!
//! An event is stored inside its object's path record as:
//!
//! ```text
//! flags (1) | timestamp (8, BE) | [action_id (2, BE)] | [data_len (4, BE) | data]
//! ```
//!
//! The optional sections are present only when the matching flag bit is set.

use crate::error::{CoreError, CoreResult};
use crate::types::{ObjectId, Timestamp};

/// Flag bit: an action id follows the timestamp.
pub const EVENT_FLAG_ACTION: u8 = 0x01;
/// Flag bit: a length-prefixed data section follows.
pub const EVENT_FLAG_DATA: u8 = 0x02;

const KNOWN_FLAGS: u8 = EVENT_FLAG_ACTION | EVENT_FLAG_DATA;

/// Size of the flags byte plus timestamp.
const FIXED_SIZE: usize = 1 + 8;

/// Packed size of an event with no action and no data.
pub const MIN_EVENT_SIZE: usize = FIXED_SIZE;
const ACTION_SIZE: usize = 2;
const DATA_LEN_SIZE: usize = 4;

/// Turns events into their packed byte form.
///
/// The block layer only needs to know how large an event is and how to
/// write it; [`Event`] is the built-in implementation.
pub trait EventEncoder {
    /// Returns the number of bytes [`EventEncoder::encode`] will write.
    fn encoded_size(&self) -> usize;

    /// Writes the packed event to the front of `dest`.
    ///
    /// # Errors
    ///
    /// Returns an error if `dest` is too short.
    fn encode(&self, dest: &mut [u8]) -> CoreResult<usize>;
}

/// A single timestamped event for one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Object the event belongs to. Not stored in the packed form; the
    /// enclosing path record carries it.
    pub object_id: ObjectId,
    /// Event time.
    pub timestamp: Timestamp,
    /// Action identifier, or 0 for none.
    pub action_id: u16,
    /// Opaque payload.
    pub data: Vec<u8>,
}

impl Event {
    /// Creates an event with no action and no data.
    #[must_use]
    pub fn new(object_id: ObjectId, timestamp: Timestamp) -> Self {
        Self {
            object_id,
            timestamp,
            action_id: 0,
            data: Vec::new(),
        }
    }

    /// Sets the action id.
    #[must_use]
    pub fn with_action(mut self, action_id: u16) -> Self {
        self.action_id = action_id;
        self
    }

    /// Sets the data payload.
    #[must_use]
    pub fn with_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = data.into();
        self
    }

    fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.action_id != 0 {
            flags |= EVENT_FLAG_ACTION;
        }
        if !self.data.is_empty() {
            flags |= EVENT_FLAG_DATA;
        }
        flags
    }

    /// Encodes the event into a new vector.
    #[must_use]
    pub fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_size());
        buf.push(self.flags());
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        if self.action_id != 0 {
            buf.extend_from_slice(&self.action_id.to_be_bytes());
        }
        if !self.data.is_empty() {
            buf.extend_from_slice(&(self.data.len() as u32).to_be_bytes());
            buf.extend_from_slice(&self.data);
        }
        buf
    }

    /// Decodes one packed event from the front of `buf`.
    ///
    /// Returns the event and the number of bytes consumed.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Corrupted`] on unknown flags or truncated input.
    pub fn decode(buf: &[u8], object_id: ObjectId) -> CoreResult<(Self, usize)> {
        if buf.len() < FIXED_SIZE {
            return Err(CoreError::corrupted("event shorter than its fixed header"));
        }

        let flags = buf[0];
        if flags & !KNOWN_FLAGS != 0 {
            return Err(CoreError::corrupted(format!(
                "unknown event flags {flags:#04x}"
            )));
        }

        let timestamp = Timestamp::from_be_bytes(
            buf[1..9]
                .try_into()
                .map_err(|_| CoreError::corrupted("invalid timestamp"))?,
        );
        let mut pos = FIXED_SIZE;

        let mut action_id = 0;
        if flags & EVENT_FLAG_ACTION != 0 {
            let bytes = buf
                .get(pos..pos + ACTION_SIZE)
                .ok_or_else(|| CoreError::corrupted("truncated action id"))?;
            action_id = u16::from_be_bytes([bytes[0], bytes[1]]);
            pos += ACTION_SIZE;
        }

        let mut data = Vec::new();
        if flags & EVENT_FLAG_DATA != 0 {
            let bytes = buf
                .get(pos..pos + DATA_LEN_SIZE)
                .ok_or_else(|| CoreError::corrupted("truncated data length"))?;
            let len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
            pos += DATA_LEN_SIZE;

            let payload = pos
                .checked_add(len)
                .and_then(|end| buf.get(pos..end))
                .ok_or_else(|| CoreError::corrupted("truncated event data"))?;
            data = payload.to_vec();
            pos += len;
        }

        Ok((
            Self {
                object_id,
                timestamp,
                action_id,
                data,
            },
            pos,
        ))
    }
}

impl EventEncoder for Event {
    fn encoded_size(&self) -> usize {
        let mut size = FIXED_SIZE;
        if self.action_id != 0 {
            size += ACTION_SIZE;
        }
        if !self.data.is_empty() {
            size += DATA_LEN_SIZE + self.data.len();
        }
        size
    }

    fn encode(&self, dest: &mut [u8]) -> CoreResult<usize> {
        let size = self.encoded_size();
        let Some(out) = dest.get_mut(..size) else {
            return Err(CoreError::invalid_argument(format!(
                "event needs {size} bytes, destination has {}",
                dest.len()
            )));
        };
        out.copy_from_slice(&self.encode_to_vec());
        Ok(size)
    }
}

/// Reads the timestamp of the packed event at the front of `buf`.
///
/// # Errors
///
/// Returns [`CoreError::Corrupted`] if `buf` is too short.
pub fn peek_timestamp(buf: &[u8]) -> CoreResult<Timestamp> {
    let bytes = buf
        .get(1..FIXED_SIZE)
        .ok_or_else(|| CoreError::corrupted("event shorter than its fixed header"))?;
    let mut ts = [0u8; 8];
    ts.copy_from_slice(bytes);
    Ok(Timestamp::from_be_bytes(ts))
}

/// Returns the packed length of the event at the front of `buf`
/// without copying its payload.
///
/// # Errors
///
/// Returns [`CoreError::Corrupted`] on unknown flags or truncated input.
pub fn packed_len(buf: &[u8]) -> CoreResult<usize> {
    let flags = *buf
        .first()
        .ok_or_else(|| CoreError::corrupted("empty event"))?;
    if flags & !KNOWN_FLAGS != 0 {
        return Err(CoreError::corrupted(format!(
            "unknown event flags {flags:#04x}"
        )));
    }

    let mut len = FIXED_SIZE;
    if flags & EVENT_FLAG_ACTION != 0 {
        len += ACTION_SIZE;
    }
    if flags & EVENT_FLAG_DATA != 0 {
        let bytes = buf
            .get(len..len + DATA_LEN_SIZE)
            .ok_or_else(|| CoreError::corrupted("truncated data length"))?;
        len += DATA_LEN_SIZE + u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    }

    if len > buf.len() {
        return Err(CoreError::corrupted(format!(
            "event of {len} bytes overruns {} remaining",
            buf.len()
        )));
    }
    Ok(len)
}
