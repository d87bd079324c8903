//! Host-wide instance registry for cross-process port and data-dir coordination.
//!
//! The registry is a single JSON file recording which logical database (data
//! directory) is bound to which TCP port and owning process:
//!
//! ```json
//! { "instances": { "/data/app": { "port": 12000, "pid": 4242,
//!   "started": "2026-01-01T00:00:00Z", "version": "0.1.0" } } }
//! ```
//!
//! # Location
//!
//! - **Linux**: `~/.config/dbmux/registry.json`
//! - **Windows**: `%APPDATA%\dbmux\registry.json`
//! - **macOS**: `~/Library/Application Support/dbmux/registry.json`
//!
//! # Concurrency
//!
//! Mutations within one process are serialized. Separate processes sharing the
//! file perform unlocked read-modify-write cycles and can race; this is an
//! accepted limitation, not something the registry tries to hide.
//!
//! Registry I/O is synchronous `std::fs`, including when called from async
//! code (the port allocator, listener start, and `ListenerHandle` drop). The
//! file holds at most one entry per port in the reserved range, so each call
//! is a small read or write.

pub mod atomic;
pub mod instance_registry;

pub use instance_registry::{InstanceRegistry, RegistryEntry, RegistryState};
