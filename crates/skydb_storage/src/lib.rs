//! # SkyDB Storage
//!
//! Mapped byte regions for SkyDB data files.
//!
//! This crate provides the lowest-level storage abstraction for SkyDB.
//! Regions are **opaque byte buffers** - they do not interpret the blocks,
//! headers or path records stored in them.
//!
//! ## Design Principles
//!
//! - Regions are flat, randomly writable byte buffers
//! - All access goes through bounds-checked slices
//! - No knowledge of block headers, paths or events
//! - The `unsafe` mapping call is confined to [`MmapRegion`]
//!
//! ## Available Regions
//!
//! - [`InMemoryRegion`] - For testing and ephemeral data files
//! - [`MmapRegion`] - For persistent, memory-mapped data files
//!
//! ## Example
//!
//! ```rust
//! use skydb_storage::{MappedRegion, InMemoryRegion};
//!
//! let mut region = InMemoryRegion::new();
//! region.resize(11).unwrap();
//! region.as_mut_slice().copy_from_slice(b"hello world");
//! assert_eq!(region.slice(0, 5).unwrap(), b"hello");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::MappedRegion;
pub use error::{StorageError, StorageResult};
pub use file::MmapRegion;
pub use memory::InMemoryRegion;
