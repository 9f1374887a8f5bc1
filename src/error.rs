//! Error types for the lane transmitter.
//!
//! Cycle-level conditions (a full queue, a malformed boundary marker, a lane that
//! stops asserting `ready`) are never errors in this sense: the engines recover
//! from them locally and report them through sticky interrupt flags. The errors
//! here cover everything outside the cycle loop: configuration, the reference
//! packetizer, the pixel source and the task runtime.
//!
//! ## Error Categories
//!
//! - **Configuration Errors**: invalid or unparseable configuration
//! - **Format Errors**: values that do not fit the queue word or a malformed
//!   event sequence handed to the reference packetizer
//! - **Runtime Errors**: pixel source failures, a stopped transmitter, timeouts
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use lanetx::TransmitError;
//!
//! let error = TransmitError::source_failed("camera link down");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for transmitter operations.
pub type Result<T, E = TransmitError> = std::result::Result<T, E>;

/// Main error type for transmitter operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TransmitError {
    #[error("Invalid configuration for {field}: {reason}")]
    Config { field: String, reason: String },

    #[error("Failed to parse configuration: {details}")]
    ConfigParse {
        details: String,
        #[source]
        source: Option<serde_yaml_ng::Error>,
    },

    #[error("Configuration file error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Value of {bits} bits does not fit a {max_bits}-bit {field}")]
    Width { field: &'static str, bits: u32, max_bits: u32 },

    #[error("Malformed pixel sequence at event {index}: {details}")]
    MalformedSequence { index: usize, details: String },

    #[error("Pixel source failed: {reason}")]
    Source {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Transmitter is no longer running")]
    Disconnected,

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },
}

impl TransmitError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransmitError::Source { .. } => true,
            TransmitError::Timeout { .. } => true,
            TransmitError::File { .. } => true,
            TransmitError::Config { .. } => false,
            TransmitError::ConfigParse { .. } => false,
            TransmitError::Width { .. } => false,
            TransmitError::MalformedSequence { .. } => false,
            TransmitError::Disconnected => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            TransmitError::Config { .. } => vec![
                "Check the value against the documented limits",
                "Start from TransmitterConfig::default() and change one field at a time",
            ],
            TransmitError::ConfigParse { .. } => vec![
                "Check the YAML syntax",
                "Verify section and field names",
                "Remove unknown fields",
            ],
            TransmitError::File { .. } => vec![
                "Check the file exists and is readable",
                "Check file permissions",
            ],
            TransmitError::Width { .. } => vec![
                "Mask the value to the field width before building the entry",
                "Use QueueEntry::data for 64-bit payload words",
            ],
            TransmitError::MalformedSequence { .. } => vec![
                "Open every line inside a frame",
                "Close every line before ending the frame",
                "Assert at most one boundary flag per event",
            ],
            TransmitError::Source { .. } => vec![
                "Check the upstream pixel producer",
                "Restart the transmitter once the source recovers",
            ],
            TransmitError::Disconnected => vec![
                "Spawn a new transmitter",
                "Keep the handle alive for as long as the transmitter is needed",
            ],
            TransmitError::Timeout { .. } => vec![
                "Increase the timeout",
                "Check that the lane asserts ready",
                "Inspect the interrupt causes in the status register",
            ],
        }
    }

    /// Helper constructor for configuration errors.
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        TransmitError::Config { field: field.into(), reason: reason.into() }
    }

    /// Helper constructor for file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        TransmitError::File { path, source }
    }

    /// Helper constructor for width violations.
    pub fn width_exceeded(field: &'static str, bits: u32, max_bits: u32) -> Self {
        TransmitError::Width { field, bits, max_bits }
    }

    /// Helper constructor for malformed sequences found by the reference packetizer.
    pub fn malformed(index: usize, details: impl Into<String>) -> Self {
        TransmitError::MalformedSequence { index, details: details.into() }
    }

    /// Helper constructor for pixel source failures.
    pub fn source_failed(reason: impl Into<String>) -> Self {
        TransmitError::Source { reason: reason.into(), source: None }
    }

    /// Helper constructor for pixel source failures with source.
    pub fn source_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        TransmitError::Source { reason: reason.into(), source: Some(source) }
    }
}

impl From<serde_yaml_ng::Error> for TransmitError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        TransmitError::ConfigParse { details: err.to_string(), source: Some(err) }
    }
}

impl From<std::io::Error> for TransmitError {
    fn from(err: std::io::Error) -> Self {
        TransmitError::File { path: PathBuf::from("<unknown>"), source: err }
    }
}
