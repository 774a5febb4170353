//! Add-event command implementation.

use skydb_core::Event;
use std::path::Path;
use tracing::debug;

/// Runs the add-event command.
pub fn run(path: &Path, block_size: usize, event: &Event) -> Result<(), Box<dyn std::error::Error>> {
    let mut file = super::open_existing(path, block_size)?;
    let target = file.insert_event(event)?;
    file.sync()?;
    debug!(block = target, generation = %file.generation(), "event stored");

    println!(
        "Added event for object {} at {} to block {} ({} blocks)",
        event.object_id,
        event.timestamp,
        target,
        file.block_count()
    );
    Ok(())
}
