//! Managed instances: one logical database, its engine, and its access lock.
//!
//! A [`ManagedInstance`] boots its engine lazily through an [`EngineFactory`]
//! and arbitrates exclusive access between competing holders. Access is
//! handed out as an [`InstanceLease`] that releases exactly once.

pub mod engine;
pub mod events;
pub mod lease;
pub mod managed;

pub use engine::{Engine, EngineFactory, StorageLocation};
pub use events::{EventListener, EventListeners, InstanceEvent, InstanceEventKind};
pub use lease::{HolderId, InstanceLease};
pub use managed::{InstanceStats, ManagedInstance};
