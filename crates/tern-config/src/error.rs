//! Error types for configuration operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Settings document is not valid JSON or not an object.
    #[error("invalid settings document")]
    InvalidDocument {
        /// Document location.
        path: PathBuf,
        /// Decoder detail.
        reason: String,
    },
    /// Settings could not be encoded.
    #[error("failed to encode settings")]
    Encode {
        /// Source serialization error.
        #[source]
        source: serde_json::Error,
    },
    /// File system operation failed.
    #[error("filesystem operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Path involved.
        path: PathBuf,
        /// Source IO error.
        #[source]
        source: io::Error,
    },
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;
