//! Error types for dbmux.
//!
//! Arbitration and capacity failures are kept as distinct variants so callers
//! can tell "try again shortly" (`Busy`) apart from "this database cannot be
//! served right now" (`CapacityExceeded`, `NotProvisioned`).

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for the dbmux library.
#[derive(Debug, Error)]
pub enum DbmuxError {
    // Arbitration errors
    #[error("Instance {instance} is busy: no access granted within {waited:?}")]
    Busy { instance: String, waited: Duration },

    #[error("Instance pool is at capacity ({max} instances)")]
    CapacityExceeded { max: usize },

    #[error("Database {instance} is not provisioned and auto-provisioning is disabled")]
    NotProvisioned { instance: String },

    #[error("Instance {instance} has been closed")]
    InstanceClosed { instance: String },

    // Engine errors
    #[error("Engine boot failed for {instance}: {message}")]
    EngineBoot { instance: String, message: String },

    // Port allocation errors
    #[error("Port {port} is outside the allowed range {start}-{end}")]
    PortOutOfRange { port: u16, start: u16, end: u16 },

    #[error(
        "No free port in range {start}-{end}; stop unused instances with `dbmux stop-all` \
         or remove dead entries with `dbmux cleanup`"
    )]
    PortRangeExhausted { start: u16, end: u16 },

    // Registry errors
    #[error("Registry state at {path} is corrupt: {message}")]
    CorruptState { path: PathBuf, message: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Validation errors
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for dbmux operations.
pub type Result<T> = std::result::Result<T, DbmuxError>;

impl From<std::io::Error> for DbmuxError {
    fn from(err: std::io::Error) -> Self {
        DbmuxError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for DbmuxError {
    fn from(err: serde_json::Error) -> Self {
        DbmuxError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl DbmuxError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        DbmuxError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Check if the caller may reasonably retry the same request.
    ///
    /// Only a timed-out wait for exclusive access qualifies; capacity and
    /// provisioning failures will not resolve on their own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DbmuxError::Busy { .. })
    }
}
