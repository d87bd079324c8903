//! Centralized configuration for dbmux.
//!
//! Constants for the host registry, the reserved port range, and pool
//! defaults. Runtime options live on [`crate::pool::InstancePoolBuilder`].

use std::time::Duration;

/// Host-wide instance registry configuration.
pub struct RegistryConfig;

impl RegistryConfig {
    pub const APP_CONFIG_DIR_NAME: &'static str = "dbmux";
    pub const REGISTRY_FILENAME: &'static str = "registry.json";
    /// Grace period given to a process before it is force-killed by `stop`.
    pub const STOP_TIMEOUT_MS: u64 = 2000;
}

/// Reserved TCP port range.
pub struct PortConfig;

impl PortConfig {
    pub const RANGE_START: u16 = 12000;
    pub const RANGE_END: u16 = 12999;
    pub const PROBE_HOST: &'static str = "127.0.0.1";

    /// Returns true if `port` lies in the closed reserved range.
    pub fn is_in_range(port: u16) -> bool {
        (Self::RANGE_START..=Self::RANGE_END).contains(&port)
    }

    /// Number of slots in the reserved range.
    pub fn range_len() -> usize {
        usize::from(Self::RANGE_END - Self::RANGE_START) + 1
    }
}

/// Instance pool defaults.
pub struct PoolConfig;

impl PoolConfig {
    pub const DEFAULT_MAX_INSTANCES: usize = 16;
    pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
    pub const MAX_LISTENER_CONNECTIONS: usize = 64;
}
