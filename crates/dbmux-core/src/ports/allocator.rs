//! Port allocation within the reserved range.

use crate::config::PortConfig;
use crate::error::{DbmuxError, Result};
use crate::registry::InstanceRegistry;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Picks TCP ports for logical databases.
///
/// A port is handed out only if nothing in the registry claims it (stale
/// claims included, since their owner may be mid-restart) and a probe bind on
/// the loopback interface succeeds. Probes are real binds released
/// immediately, so two calls racing a third party may disagree.
pub struct PortAllocator {
    registry: Arc<InstanceRegistry>,
    host: String,
}

impl PortAllocator {
    /// Create an allocator that consults `registry` for existing claims.
    pub fn new(registry: Arc<InstanceRegistry>) -> Self {
        Self {
            registry,
            host: PortConfig::PROBE_HOST.to_string(),
        }
    }

    /// The registry this allocator consults.
    pub fn registry(&self) -> &Arc<InstanceRegistry> {
        &self.registry
    }

    /// Choose a port for `name`.
    ///
    /// A live registry entry for `name` is re-attached to as-is. Otherwise the
    /// preferred port is tried first (it must lie in the reserved range). If
    /// it is refused, the scan continues upward from the next port and wraps
    /// around to the start of the range. Without a preference the range is
    /// scanned upward from its start.
    pub async fn allocate(&self, name: &str, preferred: Option<u16>) -> Result<u16> {
        let state = self.registry.load();

        if let Some(entry) = state.instances.get(name) {
            if entry.is_alive() {
                debug!(
                    "Reusing port {} for {} (PID {} still running)",
                    entry.port, name, entry.pid
                );
                return Ok(entry.port);
            }
            debug!(
                "Stale registry entry for {} (PID {} dead), allocating fresh",
                name, entry.pid
            );
        }

        let claimed: HashSet<u16> = state.instances.values().map(|e| e.port).collect();

        if let Some(port) = preferred {
            if !PortConfig::is_in_range(port) {
                return Err(DbmuxError::PortOutOfRange {
                    port,
                    start: PortConfig::RANGE_START,
                    end: PortConfig::RANGE_END,
                });
            }
            if !claimed.contains(&port) && self.probe(port).await {
                info!("Allocated preferred port {} for {}", port, name);
                return Ok(port);
            }
            debug!("Preferred port {} unavailable for {}, scanning range", port, name);
        }

        for port in scan_order(preferred) {
            if claimed.contains(&port) {
                continue;
            }
            if self.probe(port).await {
                info!("Allocated port {} for {}", port, name);
                return Ok(port);
            }
        }

        Err(DbmuxError::PortRangeExhausted {
            start: PortConfig::RANGE_START,
            end: PortConfig::RANGE_END,
        })
    }

    async fn probe(&self, port: u16) -> bool {
        probe_port(&self.host, port).await
    }
}

/// Candidate ports in scan order: after a refused preferred port, upward from
/// the port that follows it, wrapping to the range start. Every port in the
/// range appears exactly once except the preferred one.
fn scan_order(preferred: Option<u16>) -> impl Iterator<Item = u16> {
    let (upper, lower) = match preferred {
        Some(port) => (
            port.saturating_add(1)..=PortConfig::RANGE_END,
            PortConfig::RANGE_START..=port.saturating_sub(1),
        ),
        None => (PortConfig::RANGE_START..=PortConfig::RANGE_END, 1..=0),
    };
    upper.chain(lower)
}

/// Bind `host:port` and immediately release it. Returns whether the bind
/// succeeded.
pub async fn probe_port(host: &str, port: u16) -> bool {
    match TcpListener::bind((host, port)).await {
        Ok(listener) => {
            drop(listener);
            true
        }
        Err(_) => false,
    }
}
