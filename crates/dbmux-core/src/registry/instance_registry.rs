//! JSON-file-backed registry of running database instances.

use super::atomic::{atomic_read_json, atomic_write_json};
use crate::error::{DbmuxError, Result};
use crate::platform::is_process_alive;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// A running (or previously running) instance, keyed by data directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub port: u16,
    pub pid: u32,
    pub started: DateTime<Utc>,
    pub version: String,
}

impl RegistryEntry {
    /// Whether the owning process still exists.
    pub fn is_alive(&self) -> bool {
        is_process_alive(self.pid)
    }
}

/// Full on-disk registry snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryState {
    #[serde(default)]
    pub instances: BTreeMap<String, RegistryEntry>,
}

/// Host-wide registry of instances, persisted as a single JSON file.
///
/// Every mutating call is a full read-modify-write of the file. Reads never
/// fail: a missing file is an empty registry and an unparsable file is logged
/// and treated as empty.
pub struct InstanceRegistry {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl InstanceRegistry {
    /// Open the registry at the default platform location.
    pub fn open_default() -> Result<Self> {
        let path = crate::platform::registry_file_path()?;
        Ok(Self::open_at(path))
    }

    /// Open the registry at a specific path. The file is created lazily on
    /// the first write.
    pub fn open_at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Read the durable state, surfacing corruption as [`DbmuxError::CorruptState`].
    pub fn try_load(&self) -> Result<RegistryState> {
        match atomic_read_json::<RegistryState>(&self.path) {
            Ok(state) => Ok(state.unwrap_or_default()),
            Err(DbmuxError::Json { message, .. }) => Err(DbmuxError::CorruptState {
                path: self.path.clone(),
                message,
            }),
            Err(e) => Err(e),
        }
    }

    /// Read the durable state, degrading to an empty registry on any read or
    /// parse failure.
    pub fn load(&self) -> RegistryState {
        match self.try_load() {
            Ok(state) => state,
            Err(e) => {
                warn!("Ignoring unreadable instance registry: {}", e);
                RegistryState::default()
            }
        }
    }

    /// Atomically overwrite the durable state with `state`.
    pub fn save(&self, state: &RegistryState) -> Result<()> {
        atomic_write_json(&self.path, state)
    }

    /// Record that `name` is served on `port` by process `pid`.
    ///
    /// Call only after the port has actually been bound. Replaces any previous
    /// entry for the same name.
    pub fn register(&self, name: &str, port: u16, pid: u32) -> Result<RegistryEntry> {
        let _guard = self.lock_writes();
        let mut state = self.load();

        let entry = RegistryEntry {
            port,
            pid,
            started: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        };
        state.instances.insert(name.to_string(), entry.clone());
        self.save(&state)?;

        debug!("Registered instance {}: PID {} on port {}", name, pid, port);
        Ok(entry)
    }

    /// Remove the entry for `name`. Returns whether an entry existed.
    pub fn unregister(&self, name: &str) -> Result<bool> {
        let _guard = self.lock_writes();
        let mut state = self.load();

        if state.instances.remove(name).is_none() {
            return Ok(false);
        }
        self.save(&state)?;

        debug!("Unregistered instance {}", name);
        Ok(true)
    }

    /// Look up the entry for `name`, live or stale.
    pub fn find_by_name(&self, name: &str) -> Option<RegistryEntry> {
        self.load().instances.remove(name)
    }

    /// Look up the entry for `name` only if its process is still alive.
    pub fn find_live_by_name(&self, name: &str) -> Option<RegistryEntry> {
        self.find_by_name(name).filter(RegistryEntry::is_alive)
    }

    /// Look up whichever entry claims `port`, live or stale.
    pub fn find_by_port(&self, port: u16) -> Option<(String, RegistryEntry)> {
        self.load()
            .instances
            .into_iter()
            .find(|(_, entry)| entry.port == port)
    }

    /// Snapshot of every entry.
    pub fn list_all(&self) -> BTreeMap<String, RegistryEntry> {
        self.load().instances
    }

    /// Remove every entry whose process no longer exists. Returns the number
    /// of entries removed.
    pub fn cleanup_stale(&self) -> Result<usize> {
        let _guard = self.lock_writes();
        let mut state = self.load();

        let before = state.instances.len();
        state.instances.retain(|name, entry| {
            let alive = entry.is_alive();
            if !alive {
                debug!("Cleaned up stale instance {}: PID {} (dead)", name, entry.pid);
            }
            alive
        });
        let removed = before - state.instances.len();

        if removed > 0 {
            self.save(&state)?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DEAD_PID: u32 = 999_999_999;

    fn create_test_registry() -> (InstanceRegistry, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let registry = InstanceRegistry::open_at(temp_dir.path().join("registry.json"));
        (registry, temp_dir)
    }

    #[test]
    fn test_missing_file_is_empty_registry() {
        let (registry, _temp_dir) = create_test_registry();
        assert!(registry.load().instances.is_empty());
        assert!(registry.try_load().unwrap().instances.is_empty());
    }

    #[test]
    fn test_corrupt_file_degrades_to_empty() {
        let (registry, _temp_dir) = create_test_registry();
        std::fs::write(registry.path(), "{\"instances\": [1, 2").unwrap();

        assert!(matches!(
            registry.try_load(),
            Err(DbmuxError::CorruptState { .. })
        ));
        assert!(registry.load().instances.is_empty());

        // Writes still work over a corrupt file
        registry.register("/data/a", 12000, std::process::id()).unwrap();
        assert_eq!(registry.find_by_name("/data/a").unwrap().port, 12000);
    }

    #[test]
    fn test_register_then_find_by_name_returns_fields() {
        let (registry, _temp_dir) = create_test_registry();
        let pid = std::process::id();

        let entry = registry.register("/data/a", 12001, pid).unwrap();
        let found = registry.find_by_name("/data/a").unwrap();

        assert_eq!(found, entry);
        assert_eq!(found.port, 12001);
        assert_eq!(found.pid, pid);
        assert_eq!(found.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_register_upserts() {
        let (registry, _temp_dir) = create_test_registry();

        registry.register("/data/a", 12000, 100).unwrap();
        registry.register("/data/a", 12005, 200).unwrap();

        let all = registry.list_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all["/data/a"].port, 12005);
        assert_eq!(all["/data/a"].pid, 200);
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let (registry, _temp_dir) = create_test_registry();
        registry.register("/data/a", 12000, std::process::id()).unwrap();

        assert!(registry.unregister("/data/a").unwrap());
        assert!(!registry.unregister("/data/a").unwrap());
        assert!(registry.find_by_name("/data/a").is_none());
    }

    #[test]
    fn test_find_by_port() {
        let (registry, _temp_dir) = create_test_registry();
        registry.register("/data/a", 12000, std::process::id()).unwrap();
        registry.register("/data/b", 12001, DEAD_PID).unwrap();

        let (name, entry) = registry.find_by_port(12001).unwrap();
        assert_eq!(name, "/data/b");
        assert_eq!(entry.pid, DEAD_PID);
        assert!(registry.find_by_port(12002).is_none());
    }

    #[test]
    fn test_find_live_by_name_skips_dead_pid() {
        let (registry, _temp_dir) = create_test_registry();
        registry.register("/data/dead", 12000, DEAD_PID).unwrap();
        registry.register("/data/live", 12001, std::process::id()).unwrap();

        assert!(registry.find_live_by_name("/data/dead").is_none());
        assert!(registry.find_by_name("/data/dead").is_some());
        assert!(registry.find_live_by_name("/data/live").is_some());
    }

    #[test]
    fn test_save_of_load_is_noop_on_disk() {
        let (registry, _temp_dir) = create_test_registry();
        registry.register("/data/a", 12000, std::process::id()).unwrap();
        registry.register("/data/b", 12001, DEAD_PID).unwrap();

        let before = std::fs::read_to_string(registry.path()).unwrap();
        registry.save(&registry.load()).unwrap();
        let after = std::fs::read_to_string(registry.path()).unwrap();

        let before: RegistryState = serde_json::from_str(&before).unwrap();
        let after: RegistryState = serde_json::from_str(&after).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_file_format_matches_layout() {
        let (registry, _temp_dir) = create_test_registry();
        registry.register("/data/a", 12000, 42).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(registry.path()).unwrap()).unwrap();
        let entry = &raw["instances"]["/data/a"];
        assert_eq!(entry["port"], 12000);
        assert_eq!(entry["pid"], 42);
        assert!(entry["started"].as_str().unwrap().contains('T'));
        assert!(entry["version"].is_string());
    }

    #[test]
    fn test_cleanup_stale_removes_exactly_dead_entries() {
        let (registry, _temp_dir) = create_test_registry();
        let own = std::process::id();
        registry.register("/data/live-1", 12000, own).unwrap();
        registry.register("/data/dead-1", 12001, DEAD_PID).unwrap();
        registry.register("/data/live-2", 12002, own).unwrap();
        registry.register("/data/dead-2", 12003, DEAD_PID - 1).unwrap();
        registry.register("/data/dead-3", 12004, 0).unwrap();

        let removed = registry.cleanup_stale().unwrap();
        assert_eq!(removed, 3);

        let remaining = registry.list_all();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.contains_key("/data/live-1"));
        assert!(remaining.contains_key("/data/live-2"));
    }

    #[test]
    fn test_cleanup_stale_on_clean_registry_writes_nothing() {
        let (registry, _temp_dir) = create_test_registry();
        assert_eq!(registry.cleanup_stale().unwrap(), 0);
        assert!(!registry.path().exists());
    }

    #[test]
    fn test_two_handles_same_file_see_each_other() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("shared.json");

        let reg1 = InstanceRegistry::open_at(&path);
        let reg2 = InstanceRegistry::open_at(&path);

        reg1.register("/data/shared", 12010, std::process::id()).unwrap();
        assert_eq!(reg2.find_by_name("/data/shared").unwrap().port, 12010);
    }

    #[test]
    fn test_write_failures_propagate_and_reads_degrade() {
        let temp_dir = TempDir::new().unwrap();
        // The parent of the registry path is a regular file
        let blocker = temp_dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();
        let registry = InstanceRegistry::open_at(blocker.join("registry.json"));

        let result = registry.register("/data/a", 12000, std::process::id());
        assert!(matches!(result, Err(DbmuxError::Io { .. })));
        assert!(matches!(
            registry.save(&RegistryState::default()),
            Err(DbmuxError::Io { .. })
        ));
        assert!(registry.load().instances.is_empty());
        assert!(registry.list_all().is_empty());
    }

    #[test]
    fn test_unregister_write_failure_propagates() {
        let (registry, _temp_dir) = create_test_registry();
        registry.register("/data/a", 12000, std::process::id()).unwrap();

        // Occupy this thread's temp file slot with a directory so the
        // rewrite cannot be staged
        let temp_path = crate::registry::atomic::temp_path_for(registry.path());
        std::fs::create_dir_all(temp_path.join("occupied")).unwrap();

        let result = registry.unregister("/data/a");
        assert!(matches!(result, Err(DbmuxError::Io { .. })));
        // The failed write left the previous snapshot intact
        assert!(registry.find_by_name("/data/a").is_some());
    }
}
