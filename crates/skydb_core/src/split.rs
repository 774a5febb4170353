//! Event insertion and block splitting.
//!
//! Adding an event to a block goes through a short, non-persistent state
//! machine:
//!
//! ```text
//! Locating -> {FoundExisting, NeedsInsertionPoint} -> {InPlaceInsert, SplitRequired} -> Done
//! ```
//!
//! If the event fits, its bytes are spliced into the block where object-id
//! and timestamp order say they belong. If it does not, every path of the
//! block (or of the whole span the block starts) is gathered, the event is
//! merged in, and the paths are laid out again over as many blocks as
//! needed.
//!
//! # Redistribution
//!
//! Paths are laid out by balanced recursive bisection over their packed
//! sizes. A group that fits in one block becomes one block. Otherwise the
//! group is cut at the path boundary that makes the larger half as small as
//! possible, ties going to the most even cut, and each half is laid out the
//! same way. A single path that is larger than a block is cut into span
//! pieces by packing its events greedily in timestamp order; every piece is
//! a full path record with the same object id, one per block.

use crate::data_file::DataFile;
use crate::error::{CoreError, CoreResult};
use crate::event::{Event, EventEncoder};
use crate::header::{BlockHeader, HEADER_SIZE};
use crate::path::{
    encode_path_header, timestamp_insertion_point, EventIter, PathIterator, PathPointer,
    PATH_HEADER_SIZE,
};
use crate::types::ObjectId;
use std::ops::Range;
use tracing::{debug, info, warn};

/// Where the new event's bytes go inside a single block.
enum Placement {
    /// Append into the existing path record for the object.
    FoundExisting(PathPointer),
    /// Insert a new path record.
    NeedsInsertionPoint,
}

/// Adds `event` to block `index` of `file`.
///
/// If `index` is a spanned block, the whole span it belongs to is treated
/// as the target. Returns the index of the block that now holds the event.
///
/// # Errors
///
/// - [`CoreError::Precondition`] if the file is unmapped, the index is out
///   of range, the object id is 0, or the id belongs in a block outside
///   the targeted run
/// - [`CoreError::Capacity`] if the event cannot fit even in an empty block
/// - [`CoreError::Iterator`] or [`CoreError::Corrupted`] if existing
///   records cannot be read
/// - [`CoreError::Storage`] if the region cannot grow
pub fn add_event(file: &mut DataFile, index: u32, event: &Event) -> CoreResult<u32> {
    if !file.is_mapped() {
        return Err(CoreError::precondition("data file must be mapped"));
    }
    let block = *file.block(index)?;
    if event.object_id == 0 {
        return Err(CoreError::precondition("object id 0 is reserved"));
    }

    let block_size = file.block_size();
    let capacity = block_size - HEADER_SIZE;
    let event_size = event.encoded_size();
    let new_path_size = PATH_HEADER_SIZE + event_size;
    if new_path_size > capacity {
        warn!(
            object_id = event.object_id,
            size = new_path_size,
            capacity,
            "event cannot fit in a block"
        );
        return Err(CoreError::capacity(new_path_size, capacity));
    }

    // Locating
    let start = if block.spanned {
        file.span_start(index)?
    } else {
        index
    };
    let run_len = file.block(start)?.span_count(file)?;
    check_run_bounds(file, start, run_len, event.object_id)?;

    if run_len == 1 {
        let target = *file.block(start)?;
        let placement = match target.locate_path(file, event.object_id)? {
            Some(ptr) => Placement::FoundExisting(ptr),
            None => Placement::NeedsInsertionPoint,
        };
        let extra = match placement {
            Placement::FoundExisting(_) => event_size,
            Placement::NeedsInsertionPoint => new_path_size,
        };

        if target.used_size(file)? + extra <= block_size {
            insert_in_place(file, start, placement, event)?;
            return Ok(start);
        }
    }

    split_run(file, start, run_len, event)
}

/// Rejects an object id that belongs outside the run `start..start + run_len`.
///
/// Blocks stay in ascending object-id order only if every id lands strictly
/// between the previous block's largest id and the next block's smallest.
fn check_run_bounds(file: &DataFile, start: u32, run_len: u32, object_id: ObjectId) -> CoreResult<()> {
    let blocks = file.blocks();
    let end = (start + run_len) as usize;

    if let Some(prev) = (start as usize).checked_sub(1).map(|i| &blocks[i]) {
        if !prev.is_empty() && object_id <= prev.max_object_id {
            return Err(CoreError::precondition(format!(
                "object {object_id} belongs at or before block {}, not block {start}",
                prev.index
            )));
        }
    }
    if let Some(next) = blocks.get(end) {
        if !next.is_empty() && object_id >= next.min_object_id {
            return Err(CoreError::precondition(format!(
                "object {object_id} belongs at or after block {}, not block {start}",
                next.index
            )));
        }
    }
    Ok(())
}

/// Converts a path's event byte count to its on-disk length field.
fn events_len_field(len: usize) -> CoreResult<u32> {
    u32::try_from(len).map_err(|_| {
        CoreError::invalid_argument(format!("path of {len} event bytes exceeds the length field"))
    })
}

/// InPlaceInsert: splices the event into block `index`, shifting trailing
/// bytes forward.
fn insert_in_place(
    file: &mut DataFile,
    index: u32,
    placement: Placement,
    event: &Event,
) -> CoreResult<()> {
    let base = file.block(index)?.offset(file)?;
    let encoded = event.encode_to_vec();

    let (used, insert_at, bytes, grown_path) = {
        let block = file.block_bytes(index)?;
        let mut iter = PathIterator::over(block, base, file.generation())?;
        let mut insert_at = None;
        while let Some(entry) = iter.current() {
            if insert_at.is_none() && entry.object_id > event.object_id {
                insert_at = Some(entry.offset - base);
            }
            iter.advance()?;
        }
        let used = iter.position();

        match placement {
            Placement::FoundExisting(ptr) => {
                let path = file.resolve(&ptr)?;
                let events = &path[PATH_HEADER_SIZE..];
                let at = timestamp_insertion_point(events, event.timestamp)?;
                let rel = ptr.offset - base;
                (used, rel + PATH_HEADER_SIZE + at, encoded, Some((rel, ptr.len - PATH_HEADER_SIZE)))
            }
            Placement::NeedsInsertionPoint => {
                let mut record = encode_path_header(event.object_id, events_len_field(encoded.len())?).to_vec();
                record.extend_from_slice(&encoded);
                (used, insert_at.unwrap_or(used), record, None)
            }
        }
    };

    let grown_header = match grown_path {
        Some((rel, events_len)) => Some((
            rel,
            encode_path_header(event.object_id, events_len_field(events_len + bytes.len())?),
        )),
        None => None,
    };

    let block = file.block_bytes_mut(index)?;
    block.copy_within(insert_at..used, insert_at + bytes.len());
    block[insert_at..insert_at + bytes.len()].copy_from_slice(&bytes);
    if let Some((rel, header)) = grown_header {
        block[rel..rel + PATH_HEADER_SIZE].copy_from_slice(&header);
    }

    let mut header = file.block(index)?.header();
    header.include(event.object_id, event.timestamp);
    file.write_header(index, &header)?;
    file.bump_generation();

    debug!(
        block = index,
        object_id = event.object_id,
        bytes = bytes.len(),
        used = used + bytes.len(),
        "inserted event in place"
    );
    Ok(())
}

/// One object's packed events, gathered from every block that held them.
#[derive(Debug, Clone)]
struct PathRecord {
    object_id: ObjectId,
    events: Vec<u8>,
}

impl PathRecord {
    fn packed_size(&self) -> usize {
        PATH_HEADER_SIZE + self.events.len()
    }
}

/// A contiguous run of one record's events placed in one block.
#[derive(Debug, Clone)]
struct Piece {
    record: usize,
    range: Range<usize>,
    /// Whether the record was cut across several blocks.
    partial: bool,
}

/// SplitRequired: lays the run's paths plus the event out again over as
/// many blocks as needed.
fn split_run(file: &mut DataFile, start: u32, run_len: u32, event: &Event) -> CoreResult<u32> {
    let block_size = file.block_size();
    let capacity = block_size - HEADER_SIZE;

    let mut records = gather_records(file, start, run_len)?;
    let (event_record, event_offset) = merge_event(&mut records, event)?;

    let mut groups = Vec::new();
    bisect(&records, 0..records.len(), capacity, &mut groups)?;

    let group_count = groups.len() as u32;
    if group_count < run_len {
        return Err(CoreError::corrupted(format!(
            "span at block {start} covers {run_len} blocks but its paths need only {group_count}"
        )));
    }

    let rendered = groups
        .iter()
        .map(|group| render_block(&records, group, block_size))
        .collect::<CoreResult<Vec<_>>>()?;

    // All planning is done; from here on nothing can run out of space
    if group_count > run_len {
        file.allocate_blocks_after(start + run_len - 1, group_count - run_len)?;
    }

    let mut target = start;
    for (i, (group, (bytes, header))) in groups.iter().zip(rendered).enumerate() {
        let index = start + i as u32;
        let spanned = group.iter().any(|piece| piece.partial);

        file.block_bytes_mut(index)?.copy_from_slice(&bytes);
        file.write_header(index, &header)?;
        file.set_spanned(index, spanned);

        if group
            .iter()
            .any(|p| p.record == event_record && p.range.contains(&event_offset))
        {
            target = index;
        }
    }
    file.bump_generation();

    info!(
        start,
        from = run_len,
        to = group_count,
        object_id = event.object_id,
        target,
        "split blocks"
    );
    Ok(target)
}

/// Collects the path records of `run_len` blocks from `start`, merging
/// span pieces of the same object back into one record.
fn gather_records(file: &DataFile, start: u32, run_len: u32) -> CoreResult<Vec<PathRecord>> {
    let mut records: Vec<PathRecord> = Vec::new();
    for index in start..start + run_len {
        let block = file.block(index)?;
        for entry in block.paths(file)? {
            let entry = entry?;
            let path = file.region_bytes(entry.offset, entry.len)?;
            let events = &path[PATH_HEADER_SIZE..];

            match records.last_mut() {
                Some(last) if last.object_id == entry.object_id => {
                    last.events.extend_from_slice(events);
                }
                _ => records.push(PathRecord {
                    object_id: entry.object_id,
                    events: events.to_vec(),
                }),
            }
        }
    }
    Ok(records)
}

/// Merges the event into its object's record, creating the record in
/// object-id order if needed. Returns the record index and the offset of
/// the event within the record's events.
fn merge_event(records: &mut Vec<PathRecord>, event: &Event) -> CoreResult<(usize, usize)> {
    let encoded = event.encode_to_vec();
    match records.binary_search_by_key(&event.object_id, |r| r.object_id) {
        Ok(i) => {
            let at = timestamp_insertion_point(&records[i].events, event.timestamp)?;
            records[i].events.splice(at..at, encoded);
            Ok((i, at))
        }
        Err(i) => {
            records.insert(
                i,
                PathRecord {
                    object_id: event.object_id,
                    events: encoded,
                },
            );
            Ok((i, 0))
        }
    }
}

/// Lays out `records[range]` into groups that each fit in `capacity`.
fn bisect(
    records: &[PathRecord],
    range: Range<usize>,
    capacity: usize,
    groups: &mut Vec<Vec<Piece>>,
) -> CoreResult<()> {
    let sizes: Vec<usize> = records[range.clone()]
        .iter()
        .map(PathRecord::packed_size)
        .collect();
    let total: usize = sizes.iter().sum();

    if total <= capacity {
        groups.push(
            range
                .map(|record| Piece {
                    record,
                    range: 0..records[record].events.len(),
                    partial: false,
                })
                .collect(),
        );
        return Ok(());
    }

    if range.len() == 1 {
        return span_pieces(records, range.start, capacity, groups);
    }

    // Pick the cut whose larger half is smallest, then the most even one
    let mut left = 0;
    let mut best = (usize::MAX, usize::MAX, 1);
    for (k, size) in sizes.iter().enumerate().take(sizes.len() - 1) {
        left += size;
        let right = total - left;
        let score = (left.max(right), left.abs_diff(right), k + 1);
        if score < best {
            best = score;
        }
    }
    let cut = range.start + best.2;

    bisect(records, range.start..cut, capacity, groups)?;
    bisect(records, cut..range.end, capacity, groups)
}

/// Cuts one oversized record into per-block pieces, packing its events
/// greedily in stored order.
fn span_pieces(
    records: &[PathRecord],
    record: usize,
    capacity: usize,
    groups: &mut Vec<Vec<Piece>>,
) -> CoreResult<()> {
    let room = capacity - PATH_HEADER_SIZE;
    let events = &records[record].events;

    let mut piece_start = 0;
    let mut piece_end = 0;
    for slice in EventIter::new(events) {
        let slice = slice?;
        let len = slice.bytes.len();
        if len > room {
            return Err(CoreError::capacity(PATH_HEADER_SIZE + len, capacity));
        }
        if piece_end - piece_start + len > room {
            groups.push(vec![Piece {
                record,
                range: piece_start..piece_end,
                partial: true,
            }]);
            piece_start = piece_end;
        }
        piece_end += len;
    }
    groups.push(vec![Piece {
        record,
        range: piece_start..piece_end,
        partial: true,
    }]);
    Ok(())
}

/// Builds the full bytes and header for one block of a layout.
fn render_block(
    records: &[PathRecord],
    group: &[Piece],
    block_size: usize,
) -> CoreResult<(Vec<u8>, BlockHeader)> {
    let mut bytes = vec![0u8; HEADER_SIZE];
    let mut header = BlockHeader::default();

    for piece in group {
        let record = &records[piece.record];
        let events = &record.events[piece.range.clone()];

        bytes.extend_from_slice(&encode_path_header(record.object_id, events_len_field(events.len())?));
        bytes.extend_from_slice(events);
        for slice in EventIter::new(events) {
            header.include(record.object_id, slice?.timestamp);
        }
    }

    if bytes.len() > block_size {
        return Err(CoreError::capacity(bytes.len(), block_size));
    }
    bytes.resize(block_size, 0);
    Ok((bytes, header))
}
