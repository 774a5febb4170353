//! CLI command implementations.

pub mod add_event;
pub mod init;
pub mod inspect;
pub mod verify;

use skydb_core::{DataFile, DataFileConfig};
use std::path::Path;

/// Opens an existing data file.
fn open_existing(path: &Path, block_size: usize) -> Result<DataFile, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No data file found at {}", path.display()).into());
    }
    let config = DataFileConfig::new()
        .block_size(block_size)
        .create_if_missing(false);
    Ok(DataFile::open(path, &config)?)
}
