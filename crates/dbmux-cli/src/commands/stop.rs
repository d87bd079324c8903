use anyhow::{bail, Context, Result};
use dbmux_core::config::RegistryConfig;
use dbmux_core::platform::terminate_process;
use dbmux_core::{InstanceRegistry, RegistryEntry};
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};

/// Stop the instance registered for `data_dir`.
pub fn run(registry: &InstanceRegistry, data_dir: &str, out: &mut impl Write) -> Result<()> {
    let (key, entry) = match resolve(registry, data_dir) {
        Some(found) => found,
        None => bail!("No instance registered for {}", data_dir),
    };

    stop_entry(registry, &key, &entry)?;
    writeln!(out, "Stopped {} (port {}, PID {})", key, entry.port, entry.pid)?;
    Ok(())
}

/// Stop every registered instance, continuing past individual failures.
pub fn run_all(registry: &InstanceRegistry, out: &mut impl Write) -> Result<()> {
    let entries = registry.list_all();
    if entries.is_empty() {
        writeln!(out, "No registered instances")?;
        return Ok(());
    }

    let mut failed = 0usize;
    for (key, entry) in &entries {
        match stop_entry(registry, key, entry) {
            Ok(()) => writeln!(out, "Stopped {} (port {}, PID {})", key, entry.port, entry.pid)?,
            Err(e) => {
                warn!("Failed to stop {}: {:#}", key, e);
                writeln!(out, "Failed to stop {}: {:#}", key, e)?;
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} instance(s) could not be stopped", failed, entries.len());
    }
    Ok(())
}

/// Look the entry up by the key as given, then by its canonical path.
fn resolve(registry: &InstanceRegistry, data_dir: &str) -> Option<(String, RegistryEntry)> {
    if let Some(entry) = registry.find_by_name(data_dir) {
        return Some((data_dir.to_string(), entry));
    }
    let canonical = Path::new(data_dir).canonicalize().ok()?;
    let key = canonical.display().to_string();
    registry.find_by_name(&key).map(|entry| (key, entry))
}

fn stop_entry(registry: &InstanceRegistry, key: &str, entry: &RegistryEntry) -> Result<()> {
    // Never signal ourselves; just drop the bookkeeping
    if entry.pid != std::process::id() && entry.is_alive() {
        info!("Terminating PID {} serving {}", entry.pid, key);
        let gone = terminate_process(entry.pid, RegistryConfig::STOP_TIMEOUT_MS)
            .with_context(|| format!("failed to terminate PID {}", entry.pid))?;
        if !gone {
            bail!("PID {} is still running", entry.pid);
        }
    }

    registry
        .unregister(key)
        .with_context(|| format!("failed to unregister {}", key))?;
    Ok(())
}
