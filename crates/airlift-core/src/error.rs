//! Error types for airlift-core
//!
//! The taxonomy follows how each failure is handled: configuration errors are
//! never retried and always surfaced, network errors are transient and owned
//! by the retry layer, update errors are permanent, timeouts carry their own
//! cleanup guarantees, and cancellations terminate queued work.

use std::time::Duration;
use thiserror::Error;

/// Result type alias using airlift-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for Airlift
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid client setup; never retried
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Transient transport failure; retried with backoff before surfacing
    #[error("Network error: {message}")]
    Network { message: String },

    /// Permanent update failure (hash mismatch, missing data, failed install)
    #[error("Update error: {message}")]
    Update { message: String },

    /// Content hash verification failed
    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    /// An operation exceeded its deadline
    #[error("Operation timed out after {:.1}s", .timeout.as_secs_f64())]
    Timeout { timeout: Duration },

    /// A queued operation was cancelled before it ran
    #[error("Cancelled: {message}")]
    Canceled { message: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml_ng::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create an update error
    pub fn update(message: impl Into<String>) -> Self {
        Self::Update {
            message: message.into(),
        }
    }

    /// Create a hash mismatch error
    pub fn hash_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::HashMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(timeout: Duration) -> Self {
        Self::Timeout { timeout }
    }

    /// Create a cancellation error
    pub fn canceled(message: impl Into<String>) -> Self {
        Self::Canceled {
            message: message.into(),
        }
    }

    /// Whether the retry layer should attempt this operation again
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Network { .. } | Error::Io(_))
    }
}
