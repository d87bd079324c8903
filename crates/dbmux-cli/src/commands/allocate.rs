use anyhow::Result;
use dbmux_core::{InstanceRegistry, PortAllocator};
use std::io::Write;
use std::sync::Arc;

/// Print the port the allocator would hand to `data_dir`. Nothing is
/// registered; the port is only claimed once a server binds it.
pub async fn run(
    registry: InstanceRegistry,
    data_dir: &str,
    preferred: Option<u16>,
    out: &mut impl Write,
) -> Result<()> {
    let allocator = PortAllocator::new(Arc::new(registry));
    let port = allocator.allocate(data_dir, preferred).await?;
    writeln!(out, "{}", port)?;
    Ok(())
}
