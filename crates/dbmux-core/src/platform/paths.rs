//! Platform-specific path utilities.

use crate::config::RegistryConfig;
use crate::error::{DbmuxError, Result};
use std::path::PathBuf;

/// Get the dbmux global configuration directory.
///
/// This is the well-known location for host-wide shared state such as the
/// instance registry.
///
/// # Platform Behavior
/// - **Linux**: `~/.config/dbmux` (XDG_CONFIG_HOME)
/// - **Windows**: `%APPDATA%\dbmux`
/// - **macOS**: `~/Library/Application Support/dbmux`
pub fn dbmux_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().ok_or_else(|| DbmuxError::Config {
        message: "Could not determine platform config directory".to_string(),
    })?;
    Ok(config_dir.join(RegistryConfig::APP_CONFIG_DIR_NAME))
}

/// Get the path to the host instance registry file.
///
/// Returns `{dbmux_config_dir}/registry.json`.
pub fn registry_file_path() -> Result<PathBuf> {
    Ok(dbmux_config_dir()?.join(RegistryConfig::REGISTRY_FILENAME))
}
