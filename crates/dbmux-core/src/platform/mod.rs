//! Platform abstraction layer.
//!
//! All `#[cfg]` blocks for OS-specific behavior live here:
//! - `paths` - Well-known location of the host registry
//! - `process` - Process liveness checks and termination

pub mod paths;
pub mod process;

pub use paths::{dbmux_config_dir, registry_file_path};
pub use process::{is_process_alive, terminate_process};
