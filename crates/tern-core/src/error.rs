//! Error types for the session core.
//!
//! Display strings stay constant so they are safe to aggregate in logs;
//! context lives in the variant fields.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::model::PublicKey;

/// Failure to parse a hex-encoded key or address.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyParseError {
    /// Input was not the expected number of hex characters.
    #[error("key has invalid length")]
    InvalidLength {
        /// Expected character count.
        expected: usize,
        /// Observed character count.
        actual: usize,
    },
    /// Input contained non-hex characters.
    #[error("key is not valid hex")]
    InvalidHex,
    /// Address checksum did not match its contents.
    #[error("address checksum mismatch")]
    ChecksumMismatch,
}

/// Failure to join the overlay through one bootstrap node.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BootstrapError {
    /// Host did not resolve or did not answer.
    #[error("bootstrap host unreachable")]
    HostUnreachable {
        /// Node host.
        host: String,
        /// Node port.
        port: u16,
    },
    /// Node description was rejected before contacting it.
    #[error("bootstrap node malformed")]
    MalformedNode {
        /// Node host as given.
        host: String,
        /// What was wrong with it.
        reason: &'static str,
    },
}

impl BootstrapError {
    /// Host the failure refers to.
    #[must_use]
    pub fn host(&self) -> &str {
        match self {
            Self::HostUnreachable { host, .. } | Self::MalformedNode { host, .. } => host,
        }
    }
}

/// Failure to construct a protocol engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineStartError {
    /// Proxy host is not a valid IPv4 literal or hostname.
    #[error("proxy host is invalid")]
    BadProxyHost {
        /// Offending host.
        host: String,
    },
    /// Proxy port is out of range.
    #[error("proxy port is invalid")]
    BadProxyPort {
        /// Offending port.
        port: u16,
    },
    /// Proxy type is not supported by the engine.
    #[error("proxy type is invalid")]
    BadProxyType,
    /// Proxy could not be reached.
    #[error("proxy not found")]
    ProxyNotFound {
        /// Proxy host.
        host: String,
        /// Proxy port.
        port: u16,
    },
    /// Save data could not be decoded.
    #[error("save data is malformed")]
    BadFormat {
        /// Decoder detail.
        reason: String,
    },
    /// Save data is encrypted and no key was supplied.
    #[error("save data is encrypted")]
    Encrypted,
    /// Any other engine construction failure.
    #[error("engine construction failed")]
    Native {
        /// Engine-specific detail.
        message: String,
    },
}

/// Outcome of a proxy probe that rejected the configuration.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyValidationError {
    /// Host rejected.
    #[error("proxy host is invalid")]
    BadHost,
    /// Port rejected.
    #[error("proxy port is invalid")]
    BadPort,
    /// Type rejected.
    #[error("proxy type is invalid")]
    BadType,
    /// Proxy unreachable.
    #[error("proxy not found")]
    NotFound,
}

impl ProxyValidationError {
    /// Map an engine start failure to a probe verdict.
    ///
    /// Returns `None` for failures unrelated to the proxy; the probe treats
    /// those as a passing proxy configuration.
    #[must_use]
    pub const fn from_start_error(error: &EngineStartError) -> Option<Self> {
        match error {
            EngineStartError::BadProxyHost { .. } => Some(Self::BadHost),
            EngineStartError::BadProxyPort { .. } => Some(Self::BadPort),
            EngineStartError::BadProxyType => Some(Self::BadType),
            EngineStartError::ProxyNotFound { .. } => Some(Self::NotFound),
            EngineStartError::BadFormat { .. }
            | EngineStartError::Encrypted
            | EngineStartError::Native { .. } => None,
        }
    }
}

/// Failure of a single engine operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineOperationError {
    /// No contact with this key.
    #[error("unknown contact")]
    UnknownContact {
        /// Requested key.
        public_key: PublicKey,
    },
    /// Contact already present.
    #[error("contact already exists")]
    ContactExists {
        /// Duplicate key.
        public_key: PublicKey,
    },
    /// Attempted to add our own address as a contact.
    #[error("cannot add own key as contact")]
    OwnKey,
    /// No transfer with this file number.
    #[error("file transfer not found")]
    FileNotFound {
        /// Contact key.
        public_key: PublicKey,
        /// Requested file number.
        file_number: u32,
    },
    /// Message body was empty.
    #[error("message is empty")]
    EmptyMessage,
    /// Input exceeds a protocol limit.
    #[error("value exceeds protocol limit")]
    TooLong {
        /// Which field was too long.
        field: &'static str,
        /// Limit in bytes.
        max: usize,
        /// Observed length in bytes.
        actual: usize,
    },
    /// Chunk offset does not match the transfer state.
    #[error("invalid file position")]
    InvalidPosition {
        /// File number.
        file_number: u32,
        /// Offending offset.
        position: u64,
    },
    /// Any other engine failure.
    #[error("engine operation failed")]
    Native {
        /// Engine-specific detail.
        message: String,
    },
}

/// Convenience alias for engine operation results.
pub type EngineResult<T> = Result<T, EngineOperationError>;

/// Failure of a save or contact storage backend.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Filesystem operation failed.
    #[error("storage io failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Path involved.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
    /// Blob encryption failed.
    #[error("save encryption failed")]
    Encrypt,
    /// Blob decryption failed: wrong passphrase or tampered data.
    #[error("save decryption failed")]
    Decrypt,
    /// Passphrase key derivation failed.
    #[error("save key derivation failed")]
    KeyDerivation {
        /// Derivation detail.
        reason: String,
    },
    /// Blob is encrypted but no passphrase is configured.
    #[error("save is encrypted")]
    Encrypted,
    /// Stored record could not be decoded.
    #[error("stored record is corrupt")]
    Corrupt {
        /// Decoder detail.
        reason: String,
    },
    /// Backend refused the operation.
    #[error("storage unavailable")]
    Unavailable {
        /// Backend detail.
        reason: String,
    },
}

/// Error surfaced to facade callers.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Engine could not be constructed.
    #[error("session start failed")]
    Start {
        /// Underlying failure.
        #[source]
        source: EngineStartError,
    },
    /// Engine rejected an operation.
    #[error("session operation failed")]
    Operation {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying failure.
        #[source]
        source: EngineOperationError,
    },
    /// The save manager kept failing after retries.
    #[error("session persistence failed")]
    Persistence {
        /// Operation identifier.
        operation: &'static str,
        /// Last underlying failure.
        #[source]
        source: PersistenceError,
    },
    /// The session is stopped and no longer accepts work.
    #[error("session closed")]
    Closed {
        /// Operation identifier.
        operation: &'static str,
    },
}

impl SessionError {
    /// Operation the error was raised for, when known.
    #[must_use]
    pub const fn operation(&self) -> Option<&'static str> {
        match self {
            Self::Start { .. } => None,
            Self::Operation { operation, .. }
            | Self::Persistence { operation, .. }
            | Self::Closed { operation } => Some(operation),
        }
    }
}

impl From<EngineStartError> for SessionError {
    fn from(source: EngineStartError) -> Self {
        Self::Start { source }
    }
}

/// Convenience alias for facade results.
pub type SessionResult<T> = Result<T, SessionError>;
