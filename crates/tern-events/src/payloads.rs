//! Event payload types carried between the session worker and its listeners.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier assigned to each event emitted on the bus.
pub type EventId = u64;

/// Default buffer size for the in-memory replay ring.
pub const DEFAULT_REPLAY_CAPACITY: usize = 1_024;

/// Typed events surfaced by the session worker.
///
/// Public keys are carried in their uppercase hex form so listeners can key
/// persisted contacts without depending on the core domain types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// The session moved through its lifecycle.
    SessionStateChanged {
        /// New lifecycle state.
        state: SessionState,
    },
    /// Our own connection to the overlay network changed.
    SelfConnectionChanged {
        /// Transport the engine is now connected over.
        status: ConnectionStatus,
    },
    /// A bootstrap attempt failed and will be retried on the next tick.
    BootstrapFailed {
        /// Node host that failed.
        host: String,
        /// Node port that failed.
        port: u16,
        /// Failure detail reported by the engine.
        message: String,
    },
    /// A peer asked to be added as a contact.
    ContactRequest {
        /// Requesting peer.
        public_key: String,
        /// Message attached to the request.
        message: String,
    },
    /// A contact was added to the engine's contact list.
    ContactAdded {
        /// Added contact.
        public_key: String,
    },
    /// A contact was removed from the engine's contact list.
    ContactDeleted {
        /// Removed contact.
        public_key: String,
    },
    /// A contact changed their display name.
    ContactNameChanged {
        /// Contact that changed.
        public_key: String,
        /// New display name.
        name: String,
    },
    /// A contact changed their status message.
    ContactStatusMessageChanged {
        /// Contact that changed.
        public_key: String,
        /// New status message.
        status_message: String,
    },
    /// A contact changed their availability status.
    ContactStatusChanged {
        /// Contact that changed.
        public_key: String,
        /// New availability.
        status: UserStatus,
    },
    /// A contact's connection to us changed.
    ContactConnectionChanged {
        /// Contact that changed.
        public_key: String,
        /// New connection transport.
        status: ConnectionStatus,
    },
    /// A contact started or stopped typing.
    ContactTyping {
        /// Contact that changed.
        public_key: String,
        /// Whether the contact is typing.
        typing: bool,
    },
    /// A message arrived from a contact.
    MessageReceived {
        /// Sender.
        public_key: String,
        /// Normal message or action.
        kind: MessageType,
        /// Message body.
        text: String,
    },
    /// A contact confirmed receipt of one of our messages.
    ReadReceipt {
        /// Contact that confirmed.
        public_key: String,
        /// Engine-assigned message identifier.
        message_id: u32,
    },
    /// A contact offered a file to us.
    FileOffered {
        /// Sender.
        public_key: String,
        /// Engine-assigned file number for this contact.
        file_number: u32,
        /// Data file or avatar.
        kind: FileKind,
        /// Announced size in bytes.
        size: u64,
        /// Announced file name.
        name: String,
    },
    /// A chunk of an incoming file arrived.
    FileChunkReceived {
        /// Sender.
        public_key: String,
        /// File number the chunk belongs to.
        file_number: u32,
        /// Offset of the chunk within the file.
        position: u64,
        /// Chunk payload; empty marks the end of the transfer.
        data: Vec<u8>,
    },
    /// The engine wants the next chunk of an outgoing file.
    FileChunkRequested {
        /// Receiver.
        public_key: String,
        /// File number being sent.
        file_number: u32,
        /// Offset requested.
        position: u64,
        /// Number of bytes requested; zero marks completion.
        length: usize,
    },
    /// A call with a contact ended.
    CallEnded {
        /// Contact the call was with.
        public_key: String,
    },
    /// The set of degraded components changed.
    HealthChanged {
        /// Components currently reporting failures.
        degraded: Vec<String>,
    },
}

impl Event {
    /// Machine-friendly discriminator for log fields and filtering.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SessionStateChanged { .. } => "session_state_changed",
            Self::SelfConnectionChanged { .. } => "self_connection_changed",
            Self::BootstrapFailed { .. } => "bootstrap_failed",
            Self::ContactRequest { .. } => "contact_request",
            Self::ContactAdded { .. } => "contact_added",
            Self::ContactDeleted { .. } => "contact_deleted",
            Self::ContactNameChanged { .. } => "contact_name_changed",
            Self::ContactStatusMessageChanged { .. } => "contact_status_message_changed",
            Self::ContactStatusChanged { .. } => "contact_status_changed",
            Self::ContactConnectionChanged { .. } => "contact_connection_changed",
            Self::ContactTyping { .. } => "contact_typing",
            Self::MessageReceived { .. } => "message_received",
            Self::ReadReceipt { .. } => "read_receipt",
            Self::FileOffered { .. } => "file_offered",
            Self::FileChunkReceived { .. } => "file_chunk_received",
            Self::FileChunkRequested { .. } => "file_chunk_requested",
            Self::CallEnded { .. } => "call_ended",
            Self::HealthChanged { .. } => "health_changed",
        }
    }
}

/// Metadata wrapper around events. Each envelope tracks the event id and
/// emission timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventEnvelope {
    /// Sequential identifier.
    pub id: EventId,
    /// Emission time.
    pub timestamp: DateTime<Utc>,
    /// Wrapped event.
    pub event: Event,
}

/// Lifecycle of a protocol session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No session has been started.
    #[default]
    Uninitialized,
    /// Engine constructed; initial save and contact reconciliation in flight.
    Starting,
    /// The iteration loop has completed its first tick.
    Running,
    /// Stop was requested; the loop has not yet been torn down.
    Stopping,
    /// Final save done and engine released. Terminal for this session.
    Stopped,
}

impl SessionState {
    /// Whether the session has been constructed and not yet stopped.
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Starting | Self::Running | Self::Stopping)
    }
}

/// Transport a connection currently runs over.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Not connected.
    #[default]
    None,
    /// Connected through a TCP relay.
    Tcp,
    /// Connected directly over UDP.
    Udp,
}

/// Availability advertised by a user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    /// Online and available.
    #[default]
    None,
    /// Away from the device.
    Away,
    /// Do not disturb.
    Busy,
}

/// Kind of a text message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Regular chat message.
    #[default]
    Normal,
    /// `/me`-style action.
    Action,
}

/// Kind of a file transfer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    /// Arbitrary user data.
    #[default]
    Data,
    /// Profile picture.
    Avatar,
}
