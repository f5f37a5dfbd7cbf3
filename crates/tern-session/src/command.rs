//! Units of work submitted to the session worker.

use tern_core::{FileKind, MessageType, PublicKey, SessionError, SessionResult, ToxId, UserStatus};
use tokio::sync::oneshot;

/// Reply channel carried by every command.
pub(crate) type Reply<T> = oneshot::Sender<SessionResult<T>>;

/// Command definitions consumed by the single session worker.
#[derive(Debug)]
pub(crate) enum SessionCommand {
    AcceptFriendRequest {
        public_key: PublicKey,
        respond_to: Reply<()>,
    },
    StartFileTransfer {
        public_key: PublicKey,
        file_number: u32,
        respond_to: Reply<()>,
    },
    StopFileTransfer {
        public_key: PublicKey,
        file_number: u32,
        respond_to: Reply<()>,
    },
    SendFile {
        public_key: PublicKey,
        kind: FileKind,
        size: u64,
        name: String,
        respond_to: Reply<u32>,
    },
    SendFileChunk {
        public_key: PublicKey,
        file_number: u32,
        position: u64,
        data: Vec<u8>,
        respond_to: Reply<()>,
    },
    SetName {
        name: String,
        respond_to: Reply<()>,
    },
    SetStatusMessage {
        status_message: String,
        respond_to: Reply<()>,
    },
    AddContact {
        tox_id: ToxId,
        message: String,
        respond_to: Reply<()>,
    },
    DeleteContact {
        public_key: PublicKey,
        respond_to: Reply<()>,
    },
    SendMessage {
        public_key: PublicKey,
        text: String,
        kind: MessageType,
        respond_to: Reply<u32>,
    },
    SetTyping {
        public_key: PublicKey,
        typing: bool,
        respond_to: Reply<()>,
    },
    SetStatus {
        status: UserStatus,
        respond_to: Reply<()>,
    },
    EndCall {
        public_key: PublicKey,
        respond_to: Reply<()>,
    },
    SaveData {
        respond_to: Reply<Vec<u8>>,
    },
    Name {
        respond_to: Reply<String>,
    },
    StatusMessage {
        respond_to: Reply<String>,
    },
    /// Final save and engine teardown.
    Stop { respond_to: Reply<()> },
}

impl SessionCommand {
    pub(crate) const fn operation(&self) -> &'static str {
        match self {
            Self::AcceptFriendRequest { .. } => "accept_friend_request",
            Self::StartFileTransfer { .. } => "start_file_transfer",
            Self::StopFileTransfer { .. } => "stop_file_transfer",
            Self::SendFile { .. } => "send_file",
            Self::SendFileChunk { .. } => "send_file_chunk",
            Self::SetName { .. } => "set_name",
            Self::SetStatusMessage { .. } => "set_status_message",
            Self::AddContact { .. } => "add_contact",
            Self::DeleteContact { .. } => "delete_contact",
            Self::SendMessage { .. } => "send_message",
            Self::SetTyping { .. } => "set_typing",
            Self::SetStatus { .. } => "set_status",
            Self::EndCall { .. } => "end_call",
            Self::SaveData { .. } => "save_data",
            Self::Name { .. } => "name",
            Self::StatusMessage { .. } => "status_message",
            Self::Stop { .. } => "stop",
        }
    }

    /// Resolve the command with [`SessionError::Closed`] without running it.
    /// A late `Stop` resolves successfully: the session is already down.
    pub(crate) fn reject_closed(self) {
        let operation = self.operation();
        let closed = || SessionError::Closed { operation };
        match self {
            Self::AcceptFriendRequest { respond_to, .. }
            | Self::StartFileTransfer { respond_to, .. }
            | Self::StopFileTransfer { respond_to, .. }
            | Self::SendFileChunk { respond_to, .. }
            | Self::SetName { respond_to, .. }
            | Self::SetStatusMessage { respond_to, .. }
            | Self::AddContact { respond_to, .. }
            | Self::DeleteContact { respond_to, .. }
            | Self::SetTyping { respond_to, .. }
            | Self::SetStatus { respond_to, .. }
            | Self::EndCall { respond_to, .. } => {
                let _ = respond_to.send(Err(closed()));
            }
            Self::Stop { respond_to } => {
                let _ = respond_to.send(Ok(()));
            }
            Self::SendFile { respond_to, .. } | Self::SendMessage { respond_to, .. } => {
                let _ = respond_to.send(Err(closed()));
            }
            Self::SaveData { respond_to } => {
                let _ = respond_to.send(Err(closed()));
            }
            Self::Name { respond_to } | Self::StatusMessage { respond_to } => {
                let _ = respond_to.send(Err(closed()));
            }
        }
    }
}
