//! dbmux core - multiplex single-writer embedded database engines behind TCP.
//!
//! Each logical database gets one port from a reserved range, one lazily
//! booted engine, and an exclusive lock that admits a single connection at a
//! time. Competing connections queue in FIFO order with a bounded wait.
//! Port bindings are recorded in a host-wide JSON registry so separate
//! processes can find and avoid each other.
//!
//! # Example
//!
//! ```rust,ignore
//! use dbmux_core::{InstanceListener, InstancePool, InstanceRegistry, PortAllocator};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> dbmux_core::Result<()> {
//!     let registry = Arc::new(InstanceRegistry::open_default()?);
//!     let allocator = PortAllocator::new(registry);
//!     let pool = Arc::new(
//!         InstancePool::builder(Arc::new(MyEngineFactory))
//!             .storage_root("/var/lib/app/dbs")
//!             .build()?,
//!     );
//!
//!     let handle = InstanceListener::start(pool, &allocator, "app", None, Arc::new(MyAdapter)).await?;
//!     println!("app listening on {}", handle.port);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod instance;
pub mod listener;
pub mod platform;
pub mod pool;
pub mod ports;
pub mod registry;

pub use error::{DbmuxError, Result};
pub use instance::{
    Engine, EngineFactory, EventListener, HolderId, InstanceEvent, InstanceEventKind, InstanceLease,
    InstanceStats, ManagedInstance, StorageLocation,
};
pub use listener::{InstanceListener, ListenerHandle, TransportAdapter};
pub use pool::{InstancePool, InstancePoolBuilder, PoolOptions, PoolStats};
pub use ports::PortAllocator;
pub use registry::{InstanceRegistry, RegistryEntry, RegistryState};
