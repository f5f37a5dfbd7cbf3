//! # Design
//!
//! - Centralize application-level errors for bootstrap and session supervision.
//! - Keep error messages constant while carrying context fields for debugging.
//! - Preserve source errors without re-logging at call sites.

use std::io;

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Settings could not be read or written.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: tern_config::ConfigError,
    },
    /// Logging could not be installed.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: tern_telemetry::TelemetryError,
    },
    /// A session operation failed.
    #[error("session operation failed")]
    Session {
        /// Operation identifier.
        operation: &'static str,
        /// Source session error.
        source: tern_core::SessionError,
    },
    /// Profile storage failed outside a session.
    #[error("profile storage failed")]
    Persistence {
        /// Operation identifier.
        operation: &'static str,
        /// Source storage error.
        source: tern_core::PersistenceError,
    },
    /// IO operations failed.
    #[error("io operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Source IO error.
        source: io::Error,
    },
    /// Configuration values were invalid.
    #[error("invalid configuration")]
    InvalidConfig {
        /// Field name that failed validation.
        field: &'static str,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
}

impl AppError {
    pub(crate) const fn config(operation: &'static str, source: tern_config::ConfigError) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn telemetry(
        operation: &'static str,
        source: tern_telemetry::TelemetryError,
    ) -> Self {
        Self::Telemetry { operation, source }
    }

    pub(crate) const fn session(operation: &'static str, source: tern_core::SessionError) -> Self {
        Self::Session { operation, source }
    }

    pub(crate) const fn persistence(
        operation: &'static str,
        source: tern_core::PersistenceError,
    ) -> Self {
        Self::Persistence { operation, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn helpers_build_variants_and_keep_sources() {
        let session = AppError::session(
            "session.start",
            tern_core::SessionError::Closed { operation: "stop" },
        );
        assert!(matches!(
            session,
            AppError::Session {
                operation: "session.start",
                ..
            }
        ));
        assert!(session.source().is_some());

        let persistence = AppError::persistence(
            "profiles.list",
            tern_core::PersistenceError::Unavailable {
                reason: "offline".into(),
            },
        );
        assert_eq!(persistence.to_string(), "profile storage failed");

        let config = AppError::config(
            "settings.load",
            tern_config::ConfigError::InvalidDocument {
                path: "settings.json".into(),
                reason: "bad".into(),
            },
        );
        assert!(matches!(config, AppError::Config { .. }));
    }
}
