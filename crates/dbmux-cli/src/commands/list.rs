use anyhow::Result;
use dbmux_core::{InstanceRegistry, RegistryEntry};
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
struct ListedInstance {
    data_dir: String,
    #[serde(flatten)]
    entry: RegistryEntry,
    alive: bool,
}

pub fn run(registry: &InstanceRegistry, json: bool, out: &mut impl Write) -> Result<()> {
    let listed: Vec<ListedInstance> = registry
        .list_all()
        .into_iter()
        .map(|(data_dir, entry)| ListedInstance {
            alive: entry.is_alive(),
            data_dir,
            entry,
        })
        .collect();

    if json {
        serde_json::to_writer_pretty(&mut *out, &listed)?;
        writeln!(out)?;
        return Ok(());
    }

    if listed.is_empty() {
        writeln!(out, "No registered instances")?;
        return Ok(());
    }

    writeln!(
        out,
        "{:<6} {:<8} {:<6} {:<25} {:<8} DATA DIR",
        "PORT", "PID", "STATUS", "STARTED", "VERSION"
    )?;
    for item in &listed {
        writeln!(
            out,
            "{:<6} {:<8} {:<6} {:<25} {:<8} {}",
            item.entry.port,
            item.entry.pid,
            if item.alive { "live" } else { "stale" },
            item.entry.started.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            item.entry.version,
            item.data_dir
        )?;
    }
    Ok(())
}
