//! Collaborator traits for the embedded database engine.
//!
//! dbmux never executes queries itself. It boots an engine per logical
//! database through an [`EngineFactory`], hands the resulting [`Engine`] to
//! whichever connection currently holds the instance, and closes it on
//! teardown.

use crate::error::Result;
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where an engine keeps its data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "mode", content = "path", rename_all = "lowercase")]
pub enum StorageLocation {
    /// Data directory on disk, created before the first boot.
    Durable(PathBuf),
    /// In-memory engine; nothing survives a close.
    Ephemeral,
}

impl StorageLocation {
    /// The data directory, if durable.
    pub fn path(&self) -> Option<&Path> {
        match self {
            StorageLocation::Durable(path) => Some(path),
            StorageLocation::Ephemeral => None,
        }
    }

    pub fn is_ephemeral(&self) -> bool {
        matches!(self, StorageLocation::Ephemeral)
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageLocation::Durable(path) => write!(f, "{}", path.display()),
            StorageLocation::Ephemeral => write!(f, "memory://"),
        }
    }
}

/// A booted, ready engine instance.
///
/// Exclusively owned by one [`crate::instance::ManagedInstance`]; at most one
/// connection uses it at a time.
#[async_trait::async_trait]
pub trait Engine: Send + Sync + 'static {
    /// Shut the engine down and release its storage.
    async fn close(&self) -> Result<()>;

    /// Access to the concrete engine type for transport adapters.
    fn as_any(&self) -> &dyn Any;
}

/// Constructs engines and waits for them to become ready.
#[async_trait::async_trait]
pub trait EngineFactory: Send + Sync + 'static {
    /// Boot an engine for `name` at `storage`. Resolves once the engine is
    /// ready to accept work.
    async fn boot(&self, name: &str, storage: &StorageLocation) -> Result<Arc<dyn Engine>>;
}
