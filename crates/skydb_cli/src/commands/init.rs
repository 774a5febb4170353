//! Init command implementation.

use skydb_core::{DataFile, DataFileConfig};
use std::path::Path;

/// Runs the init command.
pub fn run(path: &Path, block_size: usize) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        return Err(format!("{} already exists", path.display()).into());
    }

    let config = DataFileConfig::new().block_size(block_size);
    let mut file = DataFile::open(path, &config)?;
    file.sync()?;

    println!(
        "Created {} with {} byte blocks",
        path.display(),
        file.block_size()
    );
    Ok(())
}
