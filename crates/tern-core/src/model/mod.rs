//! Core session domain types shared across the workspace.

mod keys;

pub use keys::{CHECKSUM_SIZE, NOSPAM_SIZE, PUBLIC_KEY_SIZE, PublicKey, TOX_ID_SIZE, ToxId};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tern_events::{ConnectionStatus, FileKind, MessageType, UserStatus};

use crate::error::BootstrapError;

/// Longest display name the protocol accepts, in bytes.
pub const MAX_NAME_LENGTH: usize = 128;
/// Longest status message the protocol accepts, in bytes.
pub const MAX_STATUS_MESSAGE_LENGTH: usize = 1007;
/// Longest single message the protocol accepts, in bytes.
pub const MAX_MESSAGE_LENGTH: usize = 1372;
/// Longest contact request message, in bytes.
pub const MAX_REQUEST_MESSAGE_LENGTH: usize = 921;

/// Well-known nodes shipped as the default bootstrap set.
pub const SEED_NODES: [(&str, u16, &str); 3] = [
    (
        "tox.verdict.gg",
        33445,
        "1C5293AEF2114717547B39DA8EA6F1E331E5E358B35F9B6B5F19317911C5F976",
    ),
    (
        "tox.kurnevsky.net",
        33445,
        "82EF82BA33445A1F91A7DB27189ECFC0C013E06E3DA71F588ED692BED625EC23",
    ),
    (
        "tox.abilinski.com",
        33445,
        "10C00EB250C3233E343E2AEBA07115A5C28920E9C8D29492F6D00B29049EDC7E",
    ),
];

/// Entry point into the overlay network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BootstrapNode {
    /// DNS name or IP literal.
    pub host: String,
    /// UDP/TCP port.
    pub port: u16,
    /// Long-term key of the node.
    pub public_key: PublicKey,
}

impl BootstrapNode {
    /// Validate and build a node from its textual parts.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::MalformedNode`] for an empty host, port zero,
    /// or a key that is not 64 hex characters.
    pub fn parse(host: &str, port: u16, public_key: &str) -> Result<Self, BootstrapError> {
        let host = host.trim();
        if host.is_empty() {
            return Err(BootstrapError::MalformedNode {
                host: host.to_string(),
                reason: "empty host",
            });
        }
        if port == 0 {
            return Err(BootstrapError::MalformedNode {
                host: host.to_string(),
                reason: "port must be non-zero",
            });
        }
        let public_key =
            PublicKey::parse(public_key).map_err(|_| BootstrapError::MalformedNode {
                host: host.to_string(),
                reason: "invalid public key",
            })?;
        Ok(Self {
            host: host.to_string(),
            port,
            public_key,
        })
    }
}

/// The default seed set as parsed nodes.
#[must_use]
pub fn seed_nodes() -> Vec<BootstrapNode> {
    SEED_NODES
        .iter()
        .filter_map(|(host, port, key)| BootstrapNode::parse(host, *port, key).ok())
        .collect()
}

/// Proxy the engine routes its TCP traffic through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProxyType {
    /// Direct connections.
    #[default]
    None,
    /// HTTP CONNECT proxy.
    Http,
    /// SOCKS5 proxy.
    Socks5,
}

impl ProxyType {
    /// Integer form used in persisted settings.
    #[must_use]
    pub const fn as_persisted(self) -> i64 {
        match self {
            Self::None => 0,
            Self::Http => 1,
            Self::Socks5 => 2,
        }
    }

    /// Decode the persisted integer form; out-of-range values yield `None`.
    #[must_use]
    pub const fn from_persisted(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Http),
            2 => Some(Self::Socks5),
            _ => None,
        }
    }

    /// Whether traffic is routed through a proxy at all.
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Construction options handed to the engine factory.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct SaveOptions {
    /// Serialized engine state to resume from.
    pub save_data: Option<Vec<u8>>,
    /// Whether direct UDP is allowed.
    pub udp_enabled: bool,
    /// Proxy kind.
    pub proxy_type: ProxyType,
    /// Proxy host; ignored when `proxy_type` is `None`.
    pub proxy_address: String,
    /// Proxy port; ignored when `proxy_type` is `None`.
    pub proxy_port: u16,
}

impl SaveOptions {
    /// Options that only differ in the proxy triple.
    #[must_use]
    pub fn with_proxy(mut self, proxy_type: ProxyType, address: &str, port: u16) -> Self {
        self.proxy_type = proxy_type;
        self.proxy_address = address.to_string();
        self.proxy_port = port;
        self
    }
}

impl std::fmt::Debug for SaveOptions {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SaveOptions")
            .field("save_data_len", &self.save_data.as_ref().map(Vec::len))
            .field("udp_enabled", &self.udp_enabled)
            .field("proxy_type", &self.proxy_type)
            .field("proxy_address", &self.proxy_address)
            .field("proxy_port", &self.proxy_port)
            .finish()
    }
}

/// Metadata the engine holds for one contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    /// Contact key.
    pub public_key: PublicKey,
    /// Last known display name.
    pub name: String,
    /// Last known status message.
    pub status_message: String,
    /// Last known availability.
    pub status: UserStatus,
}

/// Locally persisted contact record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// Uppercase hex public key.
    pub public_key: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Status message.
    #[serde(default)]
    pub status_message: String,
    /// Availability.
    #[serde(default)]
    pub status: UserStatus,
    /// Transient: live connection transport.
    #[serde(default)]
    pub connection_status: ConnectionStatus,
    /// Transient: typing indicator.
    #[serde(default)]
    pub typing: bool,
    /// Time of the last message exchanged.
    #[serde(default)]
    pub last_message_at: Option<DateTime<Utc>>,
}

impl Contact {
    /// Fresh record for `public_key` with empty metadata.
    #[must_use]
    pub fn new(public_key: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            name: String::new(),
            status_message: String::new(),
            status: UserStatus::None,
            connection_status: ConnectionStatus::None,
            typing: false,
            last_message_at: None,
        }
    }

    /// Record seeded from engine metadata.
    #[must_use]
    pub fn from_info(info: &ContactInfo) -> Self {
        Self {
            name: info.name.clone(),
            status_message: info.status_message.clone(),
            status: info.status,
            ..Self::new(info.public_key.to_hex())
        }
    }

    /// Clear the fields that only make sense while a session is live.
    pub fn reset_transient(&mut self) {
        self.connection_status = ConnectionStatus::None;
        self.typing = false;
    }
}

/// Callback raised by the engine during `iterate`, drained by the session worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Our own overlay connectivity changed.
    SelfConnectionChanged {
        /// New transport.
        status: ConnectionStatus,
    },
    /// A peer asked to become a contact.
    ContactRequest {
        /// Requesting peer.
        public_key: PublicKey,
        /// Attached message.
        message: String,
    },
    /// A contact changed their name.
    ContactNameChanged {
        /// Contact.
        public_key: PublicKey,
        /// New name.
        name: String,
    },
    /// A contact changed their status message.
    ContactStatusMessageChanged {
        /// Contact.
        public_key: PublicKey,
        /// New status message.
        status_message: String,
    },
    /// A contact changed availability.
    ContactStatusChanged {
        /// Contact.
        public_key: PublicKey,
        /// New availability.
        status: UserStatus,
    },
    /// A contact's connection changed.
    ContactConnectionChanged {
        /// Contact.
        public_key: PublicKey,
        /// New transport.
        status: ConnectionStatus,
    },
    /// Typing indicator changed.
    ContactTyping {
        /// Contact.
        public_key: PublicKey,
        /// Typing or not.
        typing: bool,
    },
    /// Incoming message.
    Message {
        /// Sender.
        public_key: PublicKey,
        /// Normal or action.
        kind: MessageType,
        /// Body.
        text: String,
    },
    /// Delivery receipt.
    ReadReceipt {
        /// Contact.
        public_key: PublicKey,
        /// Message id returned by `send_message`.
        message_id: u32,
    },
    /// Incoming file offer.
    FileOffered {
        /// Sender.
        public_key: PublicKey,
        /// File number.
        file_number: u32,
        /// Data or avatar.
        kind: FileKind,
        /// Announced size.
        size: u64,
        /// Announced name.
        name: String,
    },
    /// Incoming file chunk.
    FileChunkReceived {
        /// Sender.
        public_key: PublicKey,
        /// File number.
        file_number: u32,
        /// Offset.
        position: u64,
        /// Payload.
        data: Vec<u8>,
    },
    /// Outgoing file needs data.
    FileChunkRequested {
        /// Receiver.
        public_key: PublicKey,
        /// File number.
        file_number: u32,
        /// Offset.
        position: u64,
        /// Bytes wanted.
        length: usize,
    },
    /// A call ended.
    CallEnded {
        /// Peer.
        public_key: PublicKey,
    },
}
