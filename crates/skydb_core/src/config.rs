//! Data file configuration.

use crate::error::{CoreError, CoreResult};
use crate::event::MIN_EVENT_SIZE;
use crate::header::HEADER_SIZE;
use crate::path::PATH_HEADER_SIZE;

/// Default block size (64 KB).
pub const DEFAULT_BLOCK_SIZE: usize = 0x10000;

/// Smallest block that can hold a header and one path with a bare event.
pub const MIN_BLOCK_SIZE: usize = HEADER_SIZE + PATH_HEADER_SIZE + MIN_EVENT_SIZE;

/// Largest block size; path lengths are stored as 32-bit fields.
pub const MAX_BLOCK_SIZE: usize = u32::MAX as usize;

/// Configuration for opening a data file.
#[derive(Debug, Clone)]
pub struct DataFileConfig {
    /// Bytes per block. Fixed for the lifetime of the file.
    pub block_size: usize,

    /// Whether to create the file if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to flush the mapping after every event insertion.
    pub sync_on_write: bool,
}

impl Default for DataFileConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            create_if_missing: true,
            sync_on_write: false,
        }
    }
}

impl DataFileConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the block size.
    #[must_use]
    pub const fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    /// Sets whether to create the file if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to flush after every insertion.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Checks that a block can hold a header and one path with a bare
    /// event, and that path lengths fit their 32-bit field.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Precondition`] if the block size is out of range.
    pub fn validate(&self) -> CoreResult<()> {
        if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&self.block_size) {
            return Err(CoreError::precondition(format!(
                "block size {} must be between {MIN_BLOCK_SIZE} and {MAX_BLOCK_SIZE} bytes",
                self.block_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = DataFileConfig::default();
        assert_eq!(config.block_size, DEFAULT_BLOCK_SIZE);
        assert!(config.create_if_missing);
        assert!(!config.sync_on_write);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_pattern() {
        let config = DataFileConfig::new()
            .block_size(256)
            .create_if_missing(false)
            .sync_on_write(true);

        assert_eq!(config.block_size, 256);
        assert!(!config.create_if_missing);
        assert!(config.sync_on_write);
    }

    #[test]
    fn tiny_block_size_rejected() {
        assert!(DataFileConfig::new().block_size(0).validate().is_err());
        assert!(DataFileConfig::new().block_size(44).validate().is_err());
        assert!(DataFileConfig::new().block_size(52).validate().is_err());
        assert!(DataFileConfig::new().block_size(53).validate().is_ok());
        assert_eq!(MIN_BLOCK_SIZE, 53);
    }

    #[test]
    fn smallest_block_fits_a_bare_event() {
        use crate::data_file::DataFile;
        use crate::event::Event;

        let config = DataFileConfig::new().block_size(MIN_BLOCK_SIZE);
        let mut file = DataFile::in_memory(&config).unwrap();
        file.insert_event(&Event::new(1, 0)).unwrap();
        assert_eq!(file.block(0).unwrap().used_size(&file).unwrap(), MIN_BLOCK_SIZE);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn block_size_capped_by_length_field() {
        assert!(DataFileConfig::new().block_size(MAX_BLOCK_SIZE).validate().is_ok());
        assert!(DataFileConfig::new()
            .block_size(MAX_BLOCK_SIZE + 1)
            .validate()
            .is_err());
    }
}
