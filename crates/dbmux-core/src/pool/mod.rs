//! Instance pool: the per-process supervisor of managed instances.
//!
//! The pool resolves a database name to its [`ManagedInstance`], creating and
//! booting it on first reference, and enforces the instance cap and the
//! provisioning policy before anything is constructed. Capacity and
//! provisioning failures are immediate; only the per-instance access lock
//! ever queues.

mod builder;

pub use builder::{InstancePoolBuilder, PoolOptions};

use crate::error::{DbmuxError, Result};
use crate::instance::{
    EngineFactory, EventListeners, HolderId, InstanceEvent, InstanceEventKind, InstanceLease,
    InstanceStats, ManagedInstance, StorageLocation,
};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Component, Path};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Point-in-time view of the whole pool.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub total: usize,
    pub max_instances: usize,
    pub instances: Vec<InstanceStats>,
}

/// Supervisor owning every managed instance of one process.
pub struct InstancePool {
    options: PoolOptions,
    factory: Arc<dyn EngineFactory>,
    instances: Mutex<HashMap<String, Arc<ManagedInstance>>>,
    provisioned: Mutex<HashSet<String>>,
    listeners: EventListeners,
}

impl InstancePool {
    /// Start configuring a pool that boots engines with `factory`.
    pub fn builder(factory: Arc<dyn EngineFactory>) -> InstancePoolBuilder {
        InstancePoolBuilder::new(factory)
    }

    pub(crate) fn from_parts(options: PoolOptions, factory: Arc<dyn EngineFactory>) -> Self {
        Self {
            options,
            factory,
            instances: Mutex::new(HashMap::new()),
            provisioned: Mutex::new(HashSet::new()),
            listeners: EventListeners::new(),
        }
    }

    /// The options this pool was built with.
    pub fn config(&self) -> &PoolOptions {
        &self.options
    }

    fn lock_instances(&self) -> MutexGuard<'_, HashMap<String, Arc<ManagedInstance>>> {
        self.instances.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_provisioned(&self) -> MutexGuard<'_, HashSet<String>> {
        self.provisioned.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an observer for instance and pool events.
    pub fn on_event<F>(&self, listener: F)
    where
        F: Fn(&InstanceEvent) + Send + Sync + 'static,
    {
        self.listeners.register(listener);
    }

    /// Mark `name` as known so it can be served with auto-provisioning off.
    pub fn provision(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        self.lock_provisioned().insert(name.to_string());
        debug!("Provisioned database {}", name);
        Ok(())
    }

    /// Whether an instance for `name` currently exists in the pool.
    pub fn contains(&self, name: &str) -> bool {
        self.lock_instances().contains_key(name)
    }

    /// Names of all live instances, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock_instances().keys().cloned().collect();
        names.sort();
        names
    }

    /// Where the engine for `name` keeps its data.
    pub fn storage_for(&self, name: &str) -> StorageLocation {
        match &self.options.storage_root {
            Some(root) if !self.options.ephemeral => StorageLocation::Durable(root.join(name)),
            _ => StorageLocation::Ephemeral,
        }
    }

    /// Key under which a listener for `name` is recorded in the host registry.
    ///
    /// The data directory for durable pools, `memory://<name>` otherwise.
    pub fn registry_key(&self, name: &str) -> String {
        match self.storage_for(name) {
            StorageLocation::Durable(path) => path.display().to_string(),
            StorageLocation::Ephemeral => format!("memory://{}", name),
        }
    }

    async fn is_known(&self, name: &str, storage: &StorageLocation) -> bool {
        let provisioned = self.lock_provisioned().contains(name);
        if self.options.auto_provision || provisioned {
            return true;
        }
        match storage {
            StorageLocation::Durable(path) => tokio::fs::try_exists(path).await.unwrap_or(false),
            StorageLocation::Ephemeral => false,
        }
    }

    /// Return the instance for `name`, creating and booting it if needed.
    ///
    /// Always resolves to an initialized instance. A boot failure is returned
    /// as [`DbmuxError::EngineBoot`]; the instance stays in the pool and the
    /// next call retries the boot.
    pub async fn get_or_create(&self, name: &str) -> Result<Arc<ManagedInstance>> {
        validate_name(name)?;

        let existing = self.lock_instances().get(name).cloned();
        let instance = match existing {
            Some(instance) => instance,
            None => {
                let storage = self.storage_for(name);
                if !self.is_known(name, &storage).await {
                    return Err(DbmuxError::NotProvisioned {
                        instance: name.to_string(),
                    });
                }

                let (instance, created) = {
                    let mut instances = self.lock_instances();
                    // Another task may have created it while we checked provisioning
                    if let Some(instance) = instances.get(name) {
                        (instance.clone(), false)
                    } else {
                        if instances.len() >= self.options.max_instances {
                            warn!(
                                "Refusing to create {}: pool at capacity ({})",
                                name, self.options.max_instances
                            );
                            return Err(DbmuxError::CapacityExceeded {
                                max: self.options.max_instances,
                            });
                        }
                        let instance = Arc::new(ManagedInstance::new(
                            name,
                            storage,
                            self.factory.clone(),
                            self.listeners.clone(),
                        ));
                        instances.insert(name.to_string(), instance.clone());
                        (instance, true)
                    }
                };

                if created {
                    info!("Created instance {} ({})", name, instance.storage());
                    self.listeners.emit(InstanceEventKind::Created, name);
                }
                instance
            }
        };

        instance.initialize().await?;
        Ok(instance)
    }

    /// Resolve `name` and wait for exclusive access on behalf of `holder`.
    ///
    /// `timeout` of `None` uses the pool's default acquire timeout.
    pub async fn acquire(
        &self,
        name: &str,
        holder: HolderId,
        timeout: Option<Duration>,
    ) -> Result<InstanceLease> {
        let instance = self.get_or_create(name).await?;
        let timeout = timeout.unwrap_or(self.options.acquire_timeout);
        instance.acquire(holder, timeout).await
    }

    /// Remove and close one instance. Returns whether it existed.
    pub async fn close_instance(&self, name: &str) -> Result<bool> {
        let removed = self.lock_instances().remove(name);
        let Some(instance) = removed else {
            return Ok(false);
        };

        let result = instance.close().await;
        self.listeners.emit(InstanceEventKind::Removed, name);
        result.map(|_| true)
    }

    /// Close every instance concurrently and wait for all teardowns.
    ///
    /// Every instance is removed even if some closes fail; the first failure
    /// is returned.
    pub async fn close_all(&self) -> Result<()> {
        let drained: Vec<(String, Arc<ManagedInstance>)> = self.lock_instances().drain().collect();
        if drained.is_empty() {
            return Ok(());
        }
        info!("Closing {} instance(s)", drained.len());

        let results = futures::future::join_all(drained.iter().map(|(_, instance)| instance.close())).await;

        let mut first_error = None;
        for ((name, _), result) in drained.iter().zip(results) {
            self.listeners.emit(InstanceEventKind::Removed, name);
            if let Err(e) = result {
                warn!("Failed to close {}: {}", name, e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Snapshot of every instance, sorted by name.
    pub fn stats(&self) -> PoolStats {
        let mut instances: Vec<InstanceStats> = self
            .lock_instances()
            .values()
            .map(|instance| instance.stats())
            .collect();
        instances.sort_by(|a, b| a.name.cmp(&b.name));

        PoolStats {
            total: instances.len(),
            max_instances: self.options.max_instances,
            instances,
        }
    }
}

impl std::fmt::Debug for InstancePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstancePool")
            .field("options", &self.options)
            .field("instances", &self.names())
            .field("listeners", &self.listeners)
            .finish()
    }
}

/// Database names map to a single directory under the storage root.
fn validate_name(name: &str) -> Result<()> {
    let invalid = |message: &str| DbmuxError::Validation {
        field: "name".to_string(),
        message: format!("{}: {:?}", message, name),
    };

    if name.trim().is_empty() {
        return Err(invalid("database name must not be empty"));
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(invalid("database name must be a single path component")),
    }
}
