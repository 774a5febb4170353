//! Inspect command implementation.

use serde::Serialize;
use skydb_core::{Block, DataFile, EventIter, PATH_HEADER_SIZE};
use std::path::Path;

/// Data file inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Data file path.
    pub path: String,
    /// Block size in bytes.
    pub block_size: usize,
    /// Number of blocks.
    pub block_count: u32,
    /// File size in bytes.
    pub file_size: u64,
    /// Bytes occupied by headers and path records.
    pub used_bytes: u64,
    /// Number of path records, counting each span piece.
    pub path_count: usize,
    /// Number of events.
    pub event_count: usize,
    /// Number of blocks that belong to a span.
    pub spanned_blocks: u32,
    /// Per-block details (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocks: Option<Vec<BlockStats>>,
}

/// Statistics for a single block.
#[derive(Debug, Serialize)]
pub struct BlockStats {
    /// Block index.
    pub index: u32,
    /// Smallest object id.
    pub min_object_id: u64,
    /// Largest object id.
    pub max_object_id: u64,
    /// Earliest timestamp.
    pub min_timestamp: i64,
    /// Latest timestamp.
    pub max_timestamp: i64,
    /// Whether the block is part of a span.
    pub spanned: bool,
    /// Bytes in use.
    pub used: usize,
    /// Number of path records.
    pub paths: usize,
    /// Number of events.
    pub events: usize,
}

/// Runs the inspect command.
pub fn run(
    path: &Path,
    block_size: usize,
    show_blocks: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let file = super::open_existing(path, block_size)?;

    let mut result = InspectResult {
        path: path.display().to_string(),
        block_size: file.block_size(),
        block_count: file.block_count(),
        file_size: file.block_count() as u64 * file.block_size() as u64,
        used_bytes: 0,
        path_count: 0,
        event_count: 0,
        spanned_blocks: 0,
        blocks: None,
    };

    let mut per_block = Vec::new();
    for block in file.blocks() {
        let stats = block_stats(&file, block)?;
        result.used_bytes += stats.used as u64;
        result.path_count += stats.paths;
        result.event_count += stats.events;
        if stats.spanned {
            result.spanned_blocks += 1;
        }
        per_block.push(stats);
    }
    if show_blocks {
        result.blocks = Some(per_block);
    }

    // Output
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn block_stats(file: &DataFile, block: &Block) -> Result<BlockStats, Box<dyn std::error::Error>> {
    let mut paths = 0;
    let mut events = 0;
    for entry in block.paths(file)? {
        let entry = entry?;
        let bytes = file.region_bytes(entry.offset, entry.len)?;
        paths += 1;
        events += EventIter::new(&bytes[PATH_HEADER_SIZE..]).count();
    }

    Ok(BlockStats {
        index: block.index,
        min_object_id: block.min_object_id,
        max_object_id: block.max_object_id,
        min_timestamp: block.min_timestamp,
        max_timestamp: block.max_timestamp,
        spanned: block.spanned,
        used: block.used_size(file)?,
        paths,
        events,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("SkyDB Data File Inspection");
    println!("==========================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Storage:");
    println!("  Block size:  {}", format_size(result.block_size as u64));
    println!("  File size:   {}", format_size(result.file_size));
    println!("  Used:        {}", format_size(result.used_bytes));
    println!();
    println!("Blocks:");
    println!("  Total:   {}", result.block_count);
    println!("  Spanned: {}", result.spanned_blocks);
    println!();
    println!("Records:");
    println!("  Paths:  {}", result.path_count);
    println!("  Events: {}", result.event_count);

    if let Some(blocks) = &result.blocks {
        println!();
        println!("Block details:");
        for b in blocks {
            let span = if b.spanned { " spanned" } else { "" };
            println!(
                "  [{}] objects {}..={} time {}..={} {} paths, {} events, {} bytes{}",
                b.index,
                b.min_object_id,
                b.max_object_id,
                b.min_timestamp,
                b.max_timestamp,
                b.paths,
                b.events,
                b.used,
                span
            );
        }
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} bytes", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_size_units() {
        assert_eq!(format_size(512), "512 bytes");
        assert_eq!(format_size(64 * 1024), "64.0 KB");
        assert_eq!(format_size(3 * 1024 * 1024 / 2), "1.5 MB");
    }
}
