use anyhow::{Context, Result};
use dbmux_core::InstanceRegistry;
use std::io::Write;

pub fn run(registry: &InstanceRegistry, out: &mut impl Write) -> Result<()> {
    let removed = registry
        .cleanup_stale()
        .context("failed to clean up stale registry entries")?;
    let noun = if removed == 1 { "entry" } else { "entries" };
    writeln!(out, "Removed {} stale {}", removed, noun)?;
    Ok(())
}
