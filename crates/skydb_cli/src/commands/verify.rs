//! Verify command implementation.

use skydb_core::{Block, BlockHeader, DataFile, Event, PATH_HEADER_SIZE};
use std::path::Path;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of blocks checked.
    pub blocks_checked: u32,
    /// Number of path records checked.
    pub paths_checked: usize,
    /// Number of events checked.
    pub events_checked: usize,
    /// List of errors found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs the verify command.
pub fn run(path: &Path, block_size: usize) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying data file at {}", path.display());
    println!();

    let file = super::open_existing(path, block_size)?;
    let result = verify_file(&file);

    println!("  Blocks checked: {}", result.blocks_checked);
    println!("  Paths checked:  {}", result.paths_checked);
    println!("  Events checked: {}", result.events_checked);
    for error in &result.errors {
        println!("  ERROR: {error}");
    }

    println!();
    if result.is_ok() {
        println!("✓ Data file verification passed");
        Ok(())
    } else {
        println!("✗ Data file verification failed");
        Err("Verification failed".into())
    }
}

/// Checks every block of `file`, collecting problems instead of stopping
/// at the first one.
pub fn verify_file(file: &DataFile) -> VerifyResult {
    let mut result = VerifyResult::default();
    let blocks = file.blocks();

    for block in blocks {
        result.blocks_checked += 1;
        if let Err(e) = verify_block(file, block, &mut result) {
            result.errors.push(format!("block {}: {e}", block.index));
        }
    }

    for pair in blocks.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if !a.is_empty() && !b.is_empty() && a.max_object_id > b.min_object_id {
            result.errors.push(format!(
                "blocks {} and {} overlap: {} > {}",
                a.index, b.index, a.max_object_id, b.min_object_id
            ));
        }
    }

    result
}

fn verify_block(
    file: &DataFile,
    block: &Block,
    result: &mut VerifyResult,
) -> Result<(), Box<dyn std::error::Error>> {
    let (on_disk, _) = BlockHeader::unpack(file.block_bytes(block.index)?)?;
    let mut actual = BlockHeader::default();
    let mut previous_id = 0;

    for entry in block.paths(file)? {
        let entry = entry?;
        result.paths_checked += 1;
        if entry.object_id <= previous_id {
            result.errors.push(format!(
                "block {}: object {} follows {}",
                block.index, entry.object_id, previous_id
            ));
        }
        previous_id = entry.object_id;

        let bytes = file.region_bytes(entry.offset, entry.len)?;
        let mut pos = PATH_HEADER_SIZE;
        let mut previous_ts = i64::MIN;
        while pos < bytes.len() {
            let (event, n) = Event::decode(&bytes[pos..], entry.object_id)?;
            result.events_checked += 1;
            if event.timestamp < previous_ts {
                result.errors.push(format!(
                    "block {}: object {} has timestamp {} after {}",
                    block.index, entry.object_id, event.timestamp, previous_ts
                ));
            }
            previous_ts = event.timestamp;
            actual.include(entry.object_id, event.timestamp);
            pos += n;
        }
    }

    if on_disk != actual {
        result.errors.push(format!(
            "block {}: header {:?} does not match records {:?}",
            block.index, on_disk, actual
        ));
    }
    Ok(())
}
