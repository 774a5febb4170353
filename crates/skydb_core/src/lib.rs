//! # SkyDB Core
//!
//! Block management for the SkyDB event store.
//!
//! A data file is a sequence of fixed-size blocks. Each block starts with a
//! 32-byte header giving the object-id and timestamp ranges it covers,
//! followed by path records: one per object, holding that object's packed
//! events in timestamp order.
//!
//! This crate provides:
//! - Header codec and block addressing
//! - Span resolution for objects whose paths outgrow a single block
//! - Path location and iteration within a block
//! - Event insertion with in-place splicing and block splitting
//!
//! # Example
//!
//! ```rust
//! use skydb_core::{DataFile, DataFileConfig, Event};
//!
//! let mut file = DataFile::in_memory(&DataFileConfig::new().block_size(256))?;
//! file.insert_event(&Event::new(7, 1_000).with_action(3))?;
//!
//! let block = file.block(0)?;
//! assert!(block.locate_path(&file, 7)?.is_some());
//! # Ok::<(), skydb_core::CoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod block;
mod config;
mod data_file;
mod error;
mod event;
mod header;
mod path;
mod split;
mod types;

pub use block::{Block, BlockPointer, RegionPointer, SpanBlocks};
pub use config::{DataFileConfig, DEFAULT_BLOCK_SIZE, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE};
pub use data_file::DataFile;
pub use error::{CoreError, CoreResult};
pub use event::{
    packed_len, peek_timestamp, Event, EventEncoder, EVENT_FLAG_ACTION, EVENT_FLAG_DATA,
    MIN_EVENT_SIZE,
};
pub use header::{BlockHeader, HEADER_SIZE};
pub use path::{
    decode_path_header, encode_path_header, timestamp_insertion_point, EventIter, EventSlice,
    PathEntry, PathIterator, PathPointer, PATH_HEADER_SIZE,
};
pub use split::add_event;
pub use types::{Generation, ObjectId, Timestamp};

/// Crate version, reported by the command-line tool.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
