//! Error types for the recorder pipeline.
//!
//! All errors implement `std::error::Error` and carry structured context so a
//! failure can be logged once and classified without string matching.
//!
//! ## Error Categories
//!
//! - **Configuration Errors**: missing or invalid parameters, unbound signals.
//!   Fatal to initialization; the pipeline never starts sampling with them.
//! - **File Errors**: open/write/truncate failures on log or export files.
//!   Logged, the affected record is dropped, the pipeline continues.
//! - **Network Errors**: stream send failures. Logged and counted, never retried.
//! - **Integrity Errors**: corrupt trailing records found during startup.
//!   Self-healing; reported for diagnostics only.
//! - **Capacity Errors**: a sample larger than a buffer can hold. These are
//!   invariant violations and stop the pipeline.
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use railrec::RecorderError;
//!
//! let error = RecorderError::network_failed("link down");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```
//!
//! ## Helper Constructors
//!
//! ```rust
//! use railrec::RecorderError;
//! use std::path::PathBuf;
//!
//! let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
//! let file_error = RecorderError::file_error(PathBuf::from("/data/log/3.rec"), io_err);
//!
//! let config_error = RecorderError::config("log.ring_size", "must be at least 1");
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for recorder operations.
pub type Result<T, E = RecorderError> = std::result::Result<T, E>;

/// Main error type for recorder operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RecorderError {
    #[error("Invalid configuration for '{field}': {reason}")]
    Config { field: String, reason: String },

    #[error("Signal '{name}' cannot be bound: {reason}")]
    SignalBinding { name: String, reason: String },

    #[error("File error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Network send failed: {reason}")]
    Network {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Export failed: {reason}")]
    Export {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },

    #[error("Corrupt record in {path}: {details}")]
    Integrity { path: PathBuf, details: String },

    #[error("{buffer} buffer overflow: needed {needed} bytes, {available} available")]
    CapacityExceeded { buffer: &'static str, needed: usize, available: usize },

    #[error("Recorder pipeline has shut down")]
    Shutdown,
}

impl RecorderError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            RecorderError::Network { .. } => true,
            RecorderError::Export { .. } => true,
            RecorderError::File { .. } => true,
            RecorderError::Config { .. } => false,
            RecorderError::SignalBinding { .. } => false,
            RecorderError::Parse { .. } => false,
            RecorderError::Integrity { .. } => false,
            RecorderError::CapacityExceeded { .. } => false,
            RecorderError::Shutdown => false,
        }
    }

    /// Returns whether this error must stop the pipeline.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RecorderError::Config { .. }
                | RecorderError::SignalBinding { .. }
                | RecorderError::CapacityExceeded { .. }
        )
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            RecorderError::Config { .. } => vec![
                "Check the recorder configuration file",
                "Verify buffer capacities cover one full sample",
                "Ensure at least one signal is configured",
            ],
            RecorderError::SignalBinding { .. } => vec![
                "Check the signal name against the control system data model",
                "Verify the configured signal type matches the source width",
            ],
            RecorderError::File { .. } => vec![
                "Check the log directory exists and is writable",
                "Ensure sufficient disk space",
                "Check file permissions",
            ],
            RecorderError::Network { .. } => vec![
                "Check the train network link",
                "Verify the stream consumer is listening",
            ],
            RecorderError::Export { .. } => vec![
                "Check the export transport is reachable",
                "Verify the export directory is writable",
            ],
            RecorderError::Parse { .. } => vec![
                "Verify the record was produced by a compatible recorder version",
                "Check the source data integrity",
            ],
            RecorderError::Integrity { .. } => vec![
                "The file is repaired automatically at startup",
                "Inspect storage health if corruption recurs",
            ],
            RecorderError::CapacityExceeded { .. } => vec![
                "Increase the buffer capacity in the configuration",
                "Reduce the number of configured signals",
            ],
            RecorderError::Shutdown => vec!["Restart the recorder"],
        }
    }

    /// Helper constructor for configuration errors.
    pub fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        RecorderError::Config { field: field.into(), reason: reason.into() }
    }

    /// Helper constructor for signal binding errors.
    pub fn signal_binding(name: impl Into<String>, reason: impl Into<String>) -> Self {
        RecorderError::SignalBinding { name: name.into(), reason: reason.into() }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        RecorderError::File { path, source }
    }

    /// Helper constructor for network errors.
    pub fn network_failed(reason: impl Into<String>) -> Self {
        RecorderError::Network { reason: reason.into(), source: None }
    }

    /// Helper constructor for network errors with source.
    pub fn network_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        RecorderError::Network { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for export errors.
    pub fn export_failed(reason: impl Into<String>) -> Self {
        RecorderError::Export { reason: reason.into(), source: None }
    }

    /// Helper constructor for parse errors.
    pub fn parse(context: impl Into<String>, details: impl Into<String>) -> Self {
        RecorderError::Parse { context: context.into(), details: details.into() }
    }

    /// Helper constructor for capacity violations.
    pub fn capacity_exceeded(buffer: &'static str, needed: usize, available: usize) -> Self {
        RecorderError::CapacityExceeded { buffer, needed, available }
    }
}

impl From<std::io::Error> for RecorderError {
    fn from(err: std::io::Error) -> Self {
        RecorderError::File { path: PathBuf::from("<unknown>"), source: err }
    }
}
