//! TCP port allocation in the reserved `[12000, 12999]` range.
//!
//! The allocator is consulted once per instance at startup, never per
//! connection.

pub mod allocator;

pub use allocator::{probe_port, PortAllocator};
