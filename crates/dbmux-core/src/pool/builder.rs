//! Builder for configuring an [`InstancePool`].

use super::InstancePool;
use crate::config::PoolConfig;
use crate::error::{DbmuxError, Result};
use crate::instance::EngineFactory;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Runtime options of an [`InstancePool`].
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Directory under which each database gets `<root>/<name>`.
    pub storage_root: Option<PathBuf>,
    /// Boot in-memory engines instead of durable ones.
    pub ephemeral: bool,
    pub max_instances: usize,
    /// Serve any valid name, not just provisioned ones.
    pub auto_provision: bool,
    /// Wait bound used when `acquire` is given no explicit timeout.
    pub acquire_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            storage_root: None,
            ephemeral: false,
            max_instances: PoolConfig::DEFAULT_MAX_INSTANCES,
            auto_provision: true,
            acquire_timeout: PoolConfig::DEFAULT_ACQUIRE_TIMEOUT,
        }
    }
}

/// Builder for configuring an [`InstancePool`].
///
/// # Example
///
/// ```rust,ignore
/// use dbmux_core::InstancePool;
///
/// let pool = InstancePool::builder(factory)
///     .storage_root("/var/lib/app/dbs")
///     .max_instances(4)
///     .auto_provision(false)
///     .build()?;
/// ```
pub struct InstancePoolBuilder {
    factory: Arc<dyn EngineFactory>,
    options: PoolOptions,
}

impl InstancePoolBuilder {
    /// Create a new builder with default options.
    pub fn new(factory: Arc<dyn EngineFactory>) -> Self {
        Self {
            factory,
            options: PoolOptions::default(),
        }
    }

    /// Base directory for durable storage. Required unless ephemeral.
    pub fn storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.options.storage_root = Some(root.into());
        self
    }

    /// Use in-memory engines.
    ///
    /// Default: `false`
    pub fn ephemeral(mut self, enable: bool) -> Self {
        self.options.ephemeral = enable;
        self
    }

    /// Maximum number of concurrently existing instances.
    ///
    /// Default: [`PoolConfig::DEFAULT_MAX_INSTANCES`]
    pub fn max_instances(mut self, max: usize) -> Self {
        self.options.max_instances = max;
        self
    }

    /// Create instances for names that were never provisioned.
    ///
    /// When disabled, only names passed to [`InstancePool::provision`] or
    /// whose durable storage directory already exists are served.
    ///
    /// Default: `true`
    pub fn auto_provision(mut self, enable: bool) -> Self {
        self.options.auto_provision = enable;
        self
    }

    /// Default wait bound for queued acquires.
    ///
    /// Default: [`PoolConfig::DEFAULT_ACQUIRE_TIMEOUT`]
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.options.acquire_timeout = timeout;
        self
    }

    /// Replace all options at once.
    pub fn options(mut self, options: PoolOptions) -> Self {
        self.options = options;
        self
    }

    /// Build the pool.
    pub fn build(self) -> Result<InstancePool> {
        if self.options.max_instances == 0 {
            return Err(DbmuxError::Config {
                message: "max_instances must be at least 1".to_string(),
            });
        }
        if !self.options.ephemeral && self.options.storage_root.is_none() {
            return Err(DbmuxError::Config {
                message: "a storage root is required unless the pool is ephemeral".to_string(),
            });
        }
        if self.options.acquire_timeout.is_zero() {
            return Err(DbmuxError::Config {
                message: "acquire_timeout must be greater than zero".to_string(),
            });
        }

        Ok(InstancePool::from_parts(self.options, self.factory))
    }
}
